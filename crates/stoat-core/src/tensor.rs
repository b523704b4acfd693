use std::sync::Arc;

use crate::backend::{Backend, BackendStorage, BinaryOp, UnaryOp};
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;

// Tensor — The fundamental data structure
//
// A Tensor is an n-dimensional array of numbers. Our Tensor:
//
//   1. Holds data on a specific device (CPU, GPU)
//   2. Has a shape (e.g., [batch, features])
//   3. Has a dtype (f32, f64, i32, u8)
//
// ARCHITECTURE:
//
//   Tensor<B: Backend> is generic over the backend. This means:
//     - Tensor<CpuBackend> holds data in CPU memory
//     - Operations are dispatched via the Backend trait
//
// MEMORY MODEL:
//
//   The inner data is wrapped in Arc (atomic reference counting), so
//   cloning a Tensor is cheap — just increments a counter. Tensors are
//   strictly immutable values: no operation mutates storage in place, and
//   every operation produces a new Tensor. This is what makes gradient
//   tape records safe to hold: a recorded input can never be changed out
//   from under the backward pass, and its storage stays alive (via Arc)
//   until both the caller's handles and the tape release it.
//
// WHY Arc + inner struct?
//
//   We separate Tensor (the handle) from TensorInner (the data) so that:
//   - Cloning Tensor is O(1) — just copies the Arc pointer
//   - The gradient tape can hold TensorIds without owning extra data
//   - Dropping a tape mid-backward releases records without touching
//     storage any caller still references

/// Unique identifier for a tensor. Used as keys in GradStore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(u64);

impl Default for TensorId {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorId {
    /// Generate a new unique tensor ID (uses a global atomic counter).
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        TensorId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Inner data of a tensor, shared via Arc.
struct TensorInner<B: Backend> {
    /// Unique identifier for this tensor (used as the gradient-store key).
    id: TensorId,
    /// The raw data stored on the backend's device, row-major.
    storage: Arc<B::Storage>,
    /// The logical shape. Invariant: shape.elem_count() == storage.len().
    shape: Shape,
    /// The device this tensor lives on.
    device: B::Device,
}

/// An immutable n-dimensional array of numbers on a specific backend.
///
/// # Type Parameter
/// - `B: Backend` — the compute backend (e.g., `CpuBackend`)
///
/// # Example
/// ```ignore
/// use stoat_core::Tensor;
/// use stoat_cpu::{CpuBackend, CpuDevice};
///
/// let a = Tensor::<CpuBackend>::from_f64_slice(&[1.0, 2.0], 2, DType::F32, &CpuDevice)?;
/// let b = a.neg()?;
/// ```
pub struct Tensor<B: Backend> {
    inner: Arc<TensorInner<B>>,
}

// Manual Clone: Arc::clone is cheap (just increment refcount).
impl<B: Backend> Clone for Tensor<B> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Tensor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tensor(id={:?}, shape={}, dtype={}, device={:?})",
            self.inner.id,
            self.inner.shape,
            self.dtype(),
            self.inner.device,
        )
    }
}

impl<B: Backend> Tensor<B> {
    // Internal constructor

    /// Create a tensor from freshly produced storage.
    ///
    /// The dtype is read off the storage itself — backends decide output
    /// dtypes (promotion policy) and the tensor layer follows.
    pub(crate) fn from_storage(storage: B::Storage, shape: Shape, device: B::Device) -> Self {
        debug_assert_eq!(shape.elem_count(), storage.len());
        Tensor {
            inner: Arc::new(TensorInner {
                id: TensorId::new(),
                storage: Arc::new(storage),
                shape,
                device,
            }),
        }
    }

    // Accessors

    /// Unique tensor ID.
    pub fn id(&self) -> TensorId {
        self.inner.id
    }

    /// The shape of this tensor.
    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    /// The dimensions as a slice (shortcut for shape().dims()).
    pub fn dims(&self) -> &[usize] {
        self.inner.shape.dims()
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.inner.shape.rank()
    }

    /// Total number of elements.
    pub fn elem_count(&self) -> usize {
        self.inner.shape.elem_count()
    }

    /// Data type of the elements.
    pub fn dtype(&self) -> DType {
        self.inner.storage.dtype()
    }

    /// The device this tensor is on.
    pub fn device(&self) -> &B::Device {
        &self.inner.device
    }

    /// Access the underlying storage.
    pub fn storage(&self) -> &B::Storage {
        &self.inner.storage
    }

    // Creation methods

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::zeros(&shape, dtype, device)?;
        Ok(Self::from_storage(storage, shape, device.clone()))
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::ones(&shape, dtype, device)?;
        Ok(Self::from_storage(storage, shape, device.clone()))
    }

    /// Create a tensor filled with a constant value.
    pub fn full(
        shape: impl Into<Shape>,
        val: f64,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let storage = B::full(&shape, val, dtype, device)?;
        Ok(Self::from_storage(storage, shape, device.clone()))
    }

    /// Create a tensor from a flat slice of f64 values.
    /// The data is converted to the specified dtype.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                shape: shape.clone(),
                expected: shape.elem_count(),
                got: data.len(),
            });
        }
        let storage = B::from_f64_slice(data, dtype, device)?;
        Ok(Self::from_storage(storage, shape, device.clone()))
    }

    /// Create a tensor from a typed slice; the dtype is inferred from T.
    pub fn from_slice<T: WithDType>(
        data: &[T],
        shape: impl Into<Shape>,
        device: &B::Device,
    ) -> Result<Self> {
        let as_f64: Vec<f64> = data.iter().map(|v| WithDType::to_f64(*v)).collect();
        Self::from_f64_slice(&as_f64, shape, T::DTYPE, device)
    }

    /// Create a tensor of zeros with the same shape, dtype, and device as `other`.
    pub fn zeros_like(other: &Self) -> Result<Self> {
        Self::zeros(other.shape().clone(), other.dtype(), other.device())
    }

    /// Create a tensor of ones with the same shape, dtype, and device as `other`.
    pub fn ones_like(other: &Self) -> Result<Self> {
        Self::ones(other.shape().clone(), other.dtype(), other.device())
    }

    /// Create a tensor filled with `val`, with the same shape, dtype, and device as `other`.
    pub fn full_like(other: &Self, val: f64) -> Result<Self> {
        Self::full(other.shape().clone(), val, other.dtype(), other.device())
    }

    // Host readback

    /// Copy the tensor's data to a Vec<f64> on the host.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        B::to_f64_vec(&self.inner.storage)
    }

    /// Read the single value of a scalar (or one-element) tensor.
    pub fn to_scalar_f64(&self) -> Result<f64> {
        if self.elem_count() != 1 {
            return Err(Error::NotAScalar {
                shape: self.shape().clone(),
            });
        }
        Ok(self.to_f64_vec()?[0])
    }

    /// Cast to a different dtype (new tensor; the original is untouched).
    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        if dtype == self.dtype() {
            return Ok(self.clone());
        }
        let storage = B::cast(&self.inner.storage, dtype, self.device())?;
        Ok(Self::from_storage(
            storage,
            self.shape().clone(),
            self.inner.device.clone(),
        ))
    }

    // Strict elementwise combinators
    //
    // These dispatch straight to the backend and are NOT recorded on any
    // gradient tape — they are the raw material gradient rules are built
    // from during the backward pass. All of them are strict: exact shape
    // equality and dtype equality, no broadcasting. A violation fails with
    // ShapeMismatch / DTypeMismatch, distinct from the invalid-argument
    // conditions of the operation catalogue.

    /// Element-wise addition: self + rhs (strict).
    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Add)
    }

    /// Element-wise subtraction: self - rhs (strict).
    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Sub)
    }

    /// Element-wise multiplication: self * rhs (strict).
    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Mul)
    }

    /// Element-wise division: self / rhs (strict).
    pub fn div(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Div)
    }

    /// Generic strict binary dispatch.
    fn binary_op(&self, rhs: &Self, op: BinaryOp) -> Result<Self> {
        if self.dtype() != rhs.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: rhs.dtype(),
            });
        }
        if self.shape() != rhs.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: rhs.shape().clone(),
            });
        }
        let storage = B::binary_op(op, &self.inner.storage, &rhs.inner.storage)?;
        Ok(Self::from_storage(
            storage,
            self.shape().clone(),
            self.inner.device.clone(),
        ))
    }

    /// Apply an untracked unary kernel. Gradient rules use this for the
    /// transcendental pieces of their own formulas (cos, cosh, ...).
    pub fn unary(&self, op: UnaryOp) -> Result<Self> {
        let storage = B::unary_op(op, &self.inner.storage)?;
        Ok(Self::from_storage(
            storage,
            self.shape().clone(),
            self.inner.device.clone(),
        ))
    }

    /// Element-wise negation: -self (untracked).
    pub fn neg(&self) -> Result<Self> {
        self.unary(UnaryOp::Neg)
    }

    /// Element-wise exponential: e^self (untracked).
    pub fn exp(&self) -> Result<Self> {
        self.unary(UnaryOp::Exp)
    }

    /// Element-wise square root (untracked).
    pub fn sqrt(&self) -> Result<Self> {
        self.unary(UnaryOp::Sqrt)
    }

    /// Element-wise square: self² (untracked).
    pub fn square(&self) -> Result<Self> {
        self.unary(UnaryOp::Square)
    }

    /// Element-wise sigmoid: 1 / (1 + e^(-self)) (untracked).
    pub fn sigmoid(&self) -> Result<Self> {
        self.unary(UnaryOp::Sigmoid)
    }

    /// Affine transform: self * mul + add (untracked).
    ///
    /// Built from full_like + strict binary ops, so it needs no extra
    /// backend kernel.
    pub fn affine(&self, mul: f64, add: f64) -> Result<Self> {
        let scaled = self.mul(&Self::full_like(self, mul)?)?;
        if add == 0.0 {
            return Ok(scaled);
        }
        scaled.add(&Self::full_like(self, add)?)
    }
}
