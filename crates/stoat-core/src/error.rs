use crate::shape::Shape;

/// All errors that can occur within Stoat.
///
/// This enum captures every failure mode: invalid scalar arguments,
/// unsupported dtypes, shape and dtype mismatches in strict elementwise
/// combination, and backend-specific errors. Using a single error type
/// across the library simplifies error propagation.
///
/// Eagerly-checked conditions (`InvalidArgument`, `UnsupportedDType`) are
/// raised before any backend kernel runs, so a failing operation has no
/// side effect — in particular, no tape record is ever created for it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A scalar argument is out of its valid range (e.g. clip bounds with
    /// min > max). Detected before backend dispatch.
    #[error("invalid argument to {op}: {msg}")]
    InvalidArgument { op: &'static str, msg: String },

    /// The operation does not accept the input's dtype (e.g. erf on u8).
    /// Detected before backend dispatch.
    #[error("{op} does not support dtype {dtype}")]
    UnsupportedDType {
        op: &'static str,
        dtype: crate::DType,
    },

    /// Shape mismatch in a strict (non-broadcasting) elementwise combination.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// DType mismatch between tensors in a strict binary operation.
    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// Element count mismatch when creating a tensor from a slice.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Tried to read a scalar from a non-scalar tensor.
    #[error("not a scalar: tensor has shape {shape}")]
    NotAScalar { shape: Shape },

    /// Generic message for cases not covered above (backend kernel failures
    /// propagate through this variant untouched).
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Stoat.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
