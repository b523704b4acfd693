// CPU Backend — Reference compute backend for Stoat
//
// This crate provides the reference implementation of the stoat-core
// Backend trait. All kernels run on the host, with rayon parallelizing
// elementwise maps once buffers grow past a threshold.
//
// ARCHITECTURE:
// - CpuDevice is a unit struct (there is only one host)
// - CpuStorage is an enum over Vec<T> for each supported dtype
// - Transcendental kernels compute through f64 and land in the promoted
//   output dtype (integer inputs come out F32); structural kernels (neg,
//   abs, ceil, floor, round, sign, square) stay in the input dtype with
//   native integer math
// - round is round-half-to-even, NaN propagates through every kernel, and
//   out-of-domain inputs (log of a negative, acosh below 1, ...) produce
//   NaN rather than being clipped into range
//
// USAGE:
//   let engine = Engine::<CpuBackend>::new(CpuDevice);
//   let x = CpuTensor::from_f64_slice(&[1.0, 2.0], 2, DType::F32, &CpuDevice)?;
//   let y = ops::exp(&engine, &x)?;

use rayon::prelude::*;

use stoat_core::backend::{Backend, BackendDevice, BackendStorage, BinaryOp, UnaryOp};
use stoat_core::bail;
use stoat_core::dtype::DType;
use stoat_core::error::Result;
use stoat_core::shape::Shape;

/// Convenience alias for tensors on the CPU backend.
pub type CpuTensor = stoat_core::Tensor<CpuBackend>;

/// Convenience alias for an engine dispatching to the CPU backend.
pub type CpuEngine = stoat_core::Engine<CpuBackend>;

// CpuDevice

/// The host device. A unit struct — there is only one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDevice;

impl BackendDevice for CpuDevice {
    fn name(&self) -> String {
        "cpu".to_string()
    }
}

// CpuStorage — One Vec per dtype

/// Host storage: a flat row-major buffer in one of the supported dtypes.
#[derive(Debug, Clone)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::I32(_) => DType::I32,
            CpuStorage::U8(_) => DType::U8,
        }
    }

    fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
            CpuStorage::I32(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
        }
    }
}

// Scalar kernels
//
// Transcendental kernels share one f64 implementation; the typed wrappers
// below handle promotion. Stability tricks:
//   sigmoid  — branch on sign so the exponential never overflows
//   softplus — max(x,0) + ln1p(e^-|x|), exact for large |x|
//   logSigmoid — -softplus(-x)

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x // preserves 0.0, -0.0, and NaN
    }
}

/// The f64 kernel for every operation that computes through floating point.
fn scalar_kernel(op: UnaryOp) -> fn(f64) -> f64 {
    match op {
        UnaryOp::Neg => |x| -x,
        UnaryOp::Ceil => f64::ceil,
        UnaryOp::Floor => f64::floor,
        UnaryOp::Round => f64::round_ties_even,
        UnaryOp::Sign => sign,
        UnaryOp::Abs => f64::abs,
        UnaryOp::Square => |x| x * x,
        UnaryOp::Reciprocal => |x| 1.0 / x,
        UnaryOp::Exp => f64::exp,
        UnaryOp::Expm1 => f64::exp_m1,
        UnaryOp::Log => f64::ln,
        UnaryOp::Log1p => f64::ln_1p,
        UnaryOp::Sqrt => f64::sqrt,
        UnaryOp::Rsqrt => |x| 1.0 / x.sqrt(),
        UnaryOp::Sigmoid => sigmoid,
        UnaryOp::LogSigmoid => |x| -softplus(-x),
        UnaryOp::Softplus => softplus,
        UnaryOp::Erf => libm::erf,
        UnaryOp::Sin => f64::sin,
        UnaryOp::Cos => f64::cos,
        UnaryOp::Tan => f64::tan,
        UnaryOp::Asin => f64::asin,
        UnaryOp::Acos => f64::acos,
        UnaryOp::Atan => f64::atan,
        UnaryOp::Sinh => f64::sinh,
        UnaryOp::Cosh => f64::cosh,
        UnaryOp::Tanh => f64::tanh,
        UnaryOp::Asinh => f64::asinh,
        UnaryOp::Acosh => f64::acosh,
        UnaryOp::Atanh => f64::atanh,
    }
}

/// Whether this op's result is mathematically non-integral, forcing
/// integer inputs to promote to F32.
fn promotes_to_float(op: UnaryOp) -> bool {
    !matches!(
        op,
        UnaryOp::Neg
            | UnaryOp::Abs
            | UnaryOp::Ceil
            | UnaryOp::Floor
            | UnaryOp::Round
            | UnaryOp::Sign
            | UnaryOp::Square
    )
}

// Elementwise map helpers — rayon above the threshold, serial below

const PAR_THRESHOLD: usize = 4096;

fn map_f64<F: Fn(f64) -> f64 + Sync>(v: &[f64], f: F) -> Vec<f64> {
    if v.len() >= PAR_THRESHOLD {
        v.par_iter().map(|&x| f(x)).collect()
    } else {
        v.iter().map(|&x| f(x)).collect()
    }
}

fn map_f32<F: Fn(f64) -> f64 + Sync>(v: &[f32], f: F) -> Vec<f32> {
    if v.len() >= PAR_THRESHOLD {
        v.par_iter().map(|&x| f(x as f64) as f32).collect()
    } else {
        v.iter().map(|&x| f(x as f64) as f32).collect()
    }
}

fn map_i32_to_f32<F: Fn(f64) -> f64 + Sync>(v: &[i32], f: F) -> Vec<f32> {
    if v.len() >= PAR_THRESHOLD {
        v.par_iter().map(|&x| f(x as f64) as f32).collect()
    } else {
        v.iter().map(|&x| f(x as f64) as f32).collect()
    }
}

fn map_u8_to_f32<F: Fn(f64) -> f64 + Sync>(v: &[u8], f: F) -> Vec<f32> {
    if v.len() >= PAR_THRESHOLD {
        v.par_iter().map(|&x| f(x as f64) as f32).collect()
    } else {
        v.iter().map(|&x| f(x as f64) as f32).collect()
    }
}

fn zip_map<T: Copy + Send + Sync, F: Fn(T, T) -> T + Sync>(a: &[T], b: &[T], f: F) -> Vec<T> {
    if a.len() >= PAR_THRESHOLD {
        a.par_iter().zip(b.par_iter()).map(|(&x, &y)| f(x, y)).collect()
    } else {
        a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect()
    }
}

// CpuBackend

/// The reference CPU backend.
#[derive(Debug, Clone, Copy)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    type Device = CpuDevice;
    type Storage = CpuStorage;

    fn zeros(shape: &Shape, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        Self::full(shape, 0.0, dtype, device)
    }

    fn ones(shape: &Shape, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        Self::full(shape, 1.0, dtype, device)
    }

    fn full(shape: &Shape, val: f64, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        let n = shape.elem_count();
        Ok(match dtype {
            DType::F32 => CpuStorage::F32(vec![val as f32; n]),
            DType::F64 => CpuStorage::F64(vec![val; n]),
            DType::I32 => CpuStorage::I32(vec![val as i32; n]),
            DType::U8 => CpuStorage::U8(vec![val as u8; n]),
        })
    }

    fn from_f64_slice(data: &[f64], dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        Ok(match dtype {
            DType::F32 => CpuStorage::F32(data.iter().map(|&x| x as f32).collect()),
            DType::F64 => CpuStorage::F64(data.to_vec()),
            DType::I32 => CpuStorage::I32(data.iter().map(|&x| x as i32).collect()),
            DType::U8 => CpuStorage::U8(data.iter().map(|&x| x as u8).collect()),
        })
    }

    fn to_f64_vec(input: &CpuStorage) -> Result<Vec<f64>> {
        Ok(match input {
            CpuStorage::F32(v) => v.iter().map(|&x| x as f64).collect(),
            CpuStorage::F64(v) => v.clone(),
            CpuStorage::I32(v) => v.iter().map(|&x| x as f64).collect(),
            CpuStorage::U8(v) => v.iter().map(|&x| x as f64).collect(),
        })
    }

    fn unary_op(op: UnaryOp, input: &CpuStorage) -> Result<CpuStorage> {
        let f = scalar_kernel(op);
        if promotes_to_float(op) {
            // Float in, float out; integers promote to F32.
            return Ok(match input {
                CpuStorage::F32(v) => CpuStorage::F32(map_f32(v, f)),
                CpuStorage::F64(v) => CpuStorage::F64(map_f64(v, f)),
                CpuStorage::I32(v) => CpuStorage::F32(map_i32_to_f32(v, f)),
                CpuStorage::U8(v) => CpuStorage::F32(map_u8_to_f32(v, f)),
            });
        }
        // Structural kernels stay in the input dtype.
        Ok(match input {
            CpuStorage::F32(v) => CpuStorage::F32(map_f32(v, f)),
            CpuStorage::F64(v) => CpuStorage::F64(map_f64(v, f)),
            CpuStorage::I32(v) => CpuStorage::I32(match op {
                UnaryOp::Neg => v.iter().map(|&x| -x).collect(),
                UnaryOp::Abs => v.iter().map(|&x| x.abs()).collect(),
                UnaryOp::Sign => v.iter().map(|&x| x.signum()).collect(),
                UnaryOp::Square => v.iter().map(|&x| x * x).collect(),
                // already integral
                UnaryOp::Ceil | UnaryOp::Floor | UnaryOp::Round => v.clone(),
                _ => bail!("{:?} is not an integer kernel", op),
            }),
            CpuStorage::U8(_) => bail!("{:?} is not supported for dtype u8", op),
        })
    }

    fn binary_op(op: BinaryOp, lhs: &CpuStorage, rhs: &CpuStorage) -> Result<CpuStorage> {
        if lhs.len() != rhs.len() {
            bail!(
                "binary op length mismatch: {} vs {}",
                lhs.len(),
                rhs.len()
            );
        }
        match (lhs, rhs) {
            (CpuStorage::F32(a), CpuStorage::F32(b)) => {
                let f: fn(f32, f32) -> f32 = match op {
                    BinaryOp::Add => |x, y| x + y,
                    BinaryOp::Sub => |x, y| x - y,
                    BinaryOp::Mul => |x, y| x * y,
                    BinaryOp::Div => |x, y| x / y,
                };
                Ok(CpuStorage::F32(zip_map(a, b, f)))
            }
            (CpuStorage::F64(a), CpuStorage::F64(b)) => {
                let f: fn(f64, f64) -> f64 = match op {
                    BinaryOp::Add => |x, y| x + y,
                    BinaryOp::Sub => |x, y| x - y,
                    BinaryOp::Mul => |x, y| x * y,
                    BinaryOp::Div => |x, y| x / y,
                };
                Ok(CpuStorage::F64(zip_map(a, b, f)))
            }
            (CpuStorage::I32(a), CpuStorage::I32(b)) => {
                let f: fn(i32, i32) -> i32 = match op {
                    BinaryOp::Add => |x, y| x.wrapping_add(y),
                    BinaryOp::Sub => |x, y| x.wrapping_sub(y),
                    BinaryOp::Mul => |x, y| x.wrapping_mul(y),
                    BinaryOp::Div => |x, y| x / y,
                };
                Ok(CpuStorage::I32(zip_map(a, b, f)))
            }
            (CpuStorage::U8(_), CpuStorage::U8(_)) => {
                bail!("binary ops are not supported for dtype u8")
            }
            _ => bail!(
                "binary op dtype mismatch: {} vs {}",
                lhs.dtype(),
                rhs.dtype()
            ),
        }
    }

    fn clamp(input: &CpuStorage, lo: f64, hi: f64) -> Result<CpuStorage> {
        Ok(match input {
            CpuStorage::F32(v) => {
                let (lo, hi) = (lo as f32, hi as f32);
                CpuStorage::F32(
                    v.iter()
                        .map(|&x| if x.is_nan() { x } else { x.clamp(lo, hi) })
                        .collect(),
                )
            }
            CpuStorage::F64(v) => CpuStorage::F64(
                v.iter()
                    .map(|&x| if x.is_nan() { x } else { x.clamp(lo, hi) })
                    .collect(),
            ),
            CpuStorage::I32(v) => CpuStorage::I32(
                v.iter()
                    .map(|&x| (x as f64).clamp(lo, hi) as i32)
                    .collect(),
            ),
            CpuStorage::U8(_) => bail!("clamp is not supported for dtype u8"),
        })
    }

    fn step(input: &CpuStorage, alpha: f64) -> Result<CpuStorage> {
        let f = move |x: f64| {
            if x.is_nan() {
                x
            } else if x > 0.0 {
                1.0
            } else {
                alpha * x
            }
        };
        Ok(match input {
            CpuStorage::F32(v) => CpuStorage::F32(map_f32(v, f)),
            CpuStorage::F64(v) => CpuStorage::F64(map_f64(v, f)),
            CpuStorage::I32(v) => CpuStorage::F32(map_i32_to_f32(v, f)),
            CpuStorage::U8(v) => CpuStorage::F32(map_u8_to_f32(v, f)),
        })
    }
}
