use crate::dtype::DType;
use crate::error::Result;
use crate::shape::Shape;
use std::fmt;

// Backend — Abstraction over compute devices (CPU, GPU, etc.)
//
// The Backend trait is the central abstraction that makes Stoat extensible.
// Each backend (CPU, CUDA, ...) implements this trait, providing its own
// storage type and one concrete kernel per elementwise operation.
//
// WHY A TRAIT AND NOT AN ENUM?
//
// Using a trait (vs. an enum like `Device::Cpu | Device::Cuda`) means:
// - New backends can be added as separate crates without modifying stoat-core
// - Each backend can have different associated types for device and storage
// - The compiler can monomorphize for performance
// - Tests can inject a mock backend without touching any global state
//
// The tradeoff is that Tensor becomes generic: Tensor<B: Backend>.
//
// KERNEL SEMANTICS every implementation must reproduce:
//
// - The output shape always equals the input shape; one kernel call per
//   operation per invocation.
// - NaN propagates through every kernel unchanged (no silent clipping).
// - Round is round-half-to-even (banker's rounding).
// - log/sqrt/asin/acos/acosh/atanh return NaN outside their domain rather
//   than clamping the input into it.
// - Transcendental kernels promote integer inputs to F32 before computing
//   (the mathematical result is non-integral); structural kernels (Neg,
//   Abs, Ceil, Floor, Round, Sign, Square) stay in the input dtype.

/// Identifies a compute device (e.g., "cpu", "cuda:0").
pub trait BackendDevice: Clone + fmt::Debug + Send + Sync + 'static {
    /// A human-readable name for this device.
    fn name(&self) -> String;
}

/// A storage buffer that holds tensor data on a specific device,
/// in row-major order.
pub trait BackendStorage: Clone + Send + Sync + 'static {
    /// The data type of the elements in this storage.
    fn dtype(&self) -> DType;

    /// Total number of elements in this storage.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Operation enums
//
// These enums parameterize the backend kernels (one trait method per
// category) and name the operation in tape records, so the backward pass
// knows which gradient rule applies.

/// Element-wise unary operations with no scalar parameters.
///
/// Clip and step are not listed here — they carry scalar parameters and
/// get their own trait methods (`clamp`, `step`) below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Ceil,
    Floor,
    Round,
    Sign,
    Abs,
    Square,
    Reciprocal,
    Exp,
    Expm1,
    Log,
    Log1p,
    Sqrt,
    Rsqrt,
    Sigmoid,
    LogSigmoid,
    Softplus,
    Erf,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
}

/// Element-wise binary operations (strict: operands have equal shape and
/// dtype). Needed by gradient rules during the backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

// Backend Trait — The core interface every backend must implement

/// The main Backend trait. Implementing this for a struct (e.g. CpuBackend)
/// makes that struct a complete compute backend for Stoat.
///
/// All kernels take storage and return new storage (immutable semantics —
/// no in-place mutation). Storage is contiguous row-major; the shape lives
/// on the Tensor and is not needed for elementwise work.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// The device type for this backend.
    type Device: BackendDevice;
    /// The storage type for this backend.
    type Storage: BackendStorage;

    //  Creation

    /// Allocate storage filled with zeros.
    fn zeros(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Allocate storage filled with ones.
    fn ones(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Allocate storage filled with a constant value.
    fn full(shape: &Shape, val: f64, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage from a flat f64 slice, converting to the target dtype.
    fn from_f64_slice(data: &[f64], dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    //  Readback

    /// Copy data from this storage to a Vec<f64> on the host.
    fn to_f64_vec(input: &Self::Storage) -> Result<Vec<f64>>;

    //  Dtype conversion

    /// Cast storage to a different dtype.
    ///
    /// The default implementation round-trips through f64 on the host.
    /// Backends should override this with a native kernel when possible.
    fn cast(input: &Self::Storage, dtype: DType, device: &Self::Device) -> Result<Self::Storage> {
        let data = Self::to_f64_vec(input)?;
        Self::from_f64_slice(&data, dtype, device)
    }

    //  Element-wise kernels

    /// Apply a unary op element-wise: result[i] = op(input[i]).
    /// The output dtype follows the promotion policy documented above.
    fn unary_op(op: UnaryOp, input: &Self::Storage) -> Result<Self::Storage>;

    /// Apply a binary op element-wise: result[i] = op(lhs[i], rhs[i]).
    /// Operands must have the same length and dtype.
    fn binary_op(op: BinaryOp, lhs: &Self::Storage, rhs: &Self::Storage)
        -> Result<Self::Storage>;

    /// Element-wise clip: result[i] = max(lo, min(input[i], hi)), NaN
    /// passing through. Callers validate `lo <= hi` before dispatch.
    fn clamp(input: &Self::Storage, lo: f64, hi: f64) -> Result<Self::Storage>;

    /// Element-wise step with a configurable negative-side slope:
    /// result[i] = 1 if input[i] > 0, else alpha * input[i] (NaN passes
    /// through). Integer inputs promote to F32 — alpha * x is non-integral.
    fn step(input: &Self::Storage, alpha: f64) -> Result<Self::Storage>;
}
