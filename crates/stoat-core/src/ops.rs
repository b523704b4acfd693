use crate::backend::{Backend, UnaryOp};
use crate::bail;
use crate::dtype::DType;
use crate::engine::{Engine, GradContext, GradRule, InputGrads, Inputs};
use crate::error::{Error, Result};
use crate::tensor::Tensor;

// Operation catalogue — Elementwise unary math
//
// Every operation here is the same thin shape: an eager argument check, a
// compute thunk dispatching exactly one backend kernel, and a gradient
// rule encoding the function's calculus derivative. The engine does the
// rest (tape recording, saved-value bookkeeping, backward replay).
//
// The hard decisions live elsewhere — the Backend contract fixes the
// numeric semantics (rounding mode, NaN propagation, dtype promotion) and
// the Engine fixes the recording discipline. What remains per operation is
// one derivative formula each:
//
//   d(e^x)     = dy * y          (y reused from forward — no recompute)
//   d(ln x)    = dy / x
//   d(sigmoid) = dy * y * (1-y)  (y reused from forward)
//   d(ceil)    = 0               (piecewise-constant, by policy)
//   ...
//
// exp, sigmoid, and tanh save their forward output through the engine's
// save hook: their derivatives are cheaper to express in terms of y than
// x, and reusing y skips a transcendental in the backward pass.

// Dispatch helpers

fn dispatch_unary<B: Backend>(
    engine: &Engine<B>,
    name: &'static str,
    op: UnaryOp,
    x: &Tensor<B>,
    rule: Option<GradRule<B>>,
) -> Result<Tensor<B>> {
    let input = x.clone();
    engine.run_kernel(
        name,
        Inputs::one("x", x.clone()),
        &[],
        rule,
        move |dev, _save| {
            let storage = B::unary_op(op, input.storage())?;
            Ok(Tensor::from_storage(
                storage,
                input.shape().clone(),
                dev.clone(),
            ))
        },
    )
}

/// Like dispatch_unary, but registers the forward output as a saved value.
fn dispatch_unary_saving<B: Backend>(
    engine: &Engine<B>,
    name: &'static str,
    op: UnaryOp,
    x: &Tensor<B>,
    rule: Option<GradRule<B>>,
) -> Result<Tensor<B>> {
    let input = x.clone();
    engine.run_kernel(
        name,
        Inputs::one("x", x.clone()),
        &[],
        rule,
        move |dev, save| {
            let storage = B::unary_op(op, input.storage())?;
            let y = Tensor::from_storage(storage, input.shape().clone(), dev.clone());
            Ok(save.keep(y))
        },
    )
}

/// Shared rule for the piecewise-constant operations: the gradient is an
/// exact zero tensor ("no local contribution"), not an error.
fn zero_grad<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
    InputGrads::new().with("x", move || Tensor::zeros_like(ctx.input("x")?))
}

// Basic arithmetic

/// Element-wise negation: `-x`.
pub fn neg<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || ctx.dy.neg())
    }
    dispatch_unary(engine, "neg", UnaryOp::Neg, x, Some(rule))
}

/// Element-wise absolute value.
///
/// Gradient: `dy * (1 if x > 0 else -1)` — the slope at zero is -1.
pub fn abs<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input("x")?;
            let vals = x.to_f64_vec()?;
            let mask: Vec<f64> = vals
                .iter()
                .map(|&v| if v > 0.0 { 1.0 } else { -1.0 })
                .collect();
            let mask = Tensor::from_f64_slice(&mask, x.shape().clone(), ctx.dy.dtype(), x.device())?;
            ctx.dy.mul(&mask)
        })
    }
    dispatch_unary(engine, "abs", UnaryOp::Abs, x, Some(rule))
}

/// Element-wise ceiling: smallest integer ≥ x. Gradient is zero everywhere.
pub fn ceil<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    dispatch_unary(engine, "ceil", UnaryOp::Ceil, x, Some(zero_grad))
}

/// Element-wise floor: largest integer ≤ x. Gradient is zero everywhere.
pub fn floor<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    dispatch_unary(engine, "floor", UnaryOp::Floor, x, Some(zero_grad))
}

/// Element-wise round to the nearest integer, half-to-even (banker's
/// rounding): round(0.5) = 0, round(1.5) = 2, round(2.5) = 2.
/// Gradient is zero everywhere.
pub fn round<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    dispatch_unary(engine, "round", UnaryOp::Round, x, Some(zero_grad))
}

/// Element-wise sign: -1, 0, or 1. Gradient is zero everywhere.
pub fn sign<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    dispatch_unary(engine, "sign", UnaryOp::Sign, x, Some(zero_grad))
}

/// Element-wise square: `x²`.
pub fn square<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.mul(&x.affine(2.0, 0.0)?)
        })
    }
    dispatch_unary(engine, "square", UnaryOp::Square, x, Some(rule))
}

/// Element-wise reciprocal: `1 / x`.
pub fn reciprocal<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.neg()?.div(&x.square()?)
        })
    }
    dispatch_unary(engine, "reciprocal", UnaryOp::Reciprocal, x, Some(rule))
}

/// Element-wise clip into `[lo, hi]`: `max(lo, min(x, hi))`.
///
/// Fails with an invalid-argument error when `lo > hi`, before any kernel
/// dispatch. Gradient: `dy` where `lo ≤ x ≤ hi`, zero outside.
pub fn clip_by_value<B: Backend>(
    engine: &Engine<B>,
    x: &Tensor<B>,
    lo: f64,
    hi: f64,
) -> Result<Tensor<B>> {
    if lo > hi {
        return Err(Error::InvalidArgument {
            op: "clipByValue",
            msg: format!("min ({lo}) must not be greater than max ({hi})"),
        });
    }
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let &[lo, hi] = ctx.params else {
                bail!("clipByValue record is missing its bounds");
            };
            let x = ctx.input("x")?;
            let vals = x.to_f64_vec()?;
            let dy = ctx.dy.to_f64_vec()?;
            let data: Vec<f64> = vals
                .iter()
                .zip(dy.iter())
                .map(|(&v, &g)| if (lo..=hi).contains(&v) { g } else { 0.0 })
                .collect();
            Tensor::from_f64_slice(&data, x.shape().clone(), ctx.dy.dtype(), x.device())
        })
    }
    let input = x.clone();
    engine.run_kernel(
        "clipByValue",
        Inputs::one("x", x.clone()),
        &[lo, hi],
        Some(rule),
        move |dev, _save| {
            let storage = B::clamp(input.storage(), lo, hi)?;
            Ok(Tensor::from_storage(
                storage,
                input.shape().clone(),
                dev.clone(),
            ))
        },
    )
}

/// Element-wise step with a configurable negative-side slope:
/// `1 if x > 0 else alpha * x`.
///
/// The gradient is zero everywhere, matching the ceil/floor/round policy —
/// the slope parameter shapes the forward value only.
pub fn step<B: Backend>(engine: &Engine<B>, x: &Tensor<B>, alpha: f64) -> Result<Tensor<B>> {
    let input = x.clone();
    engine.run_kernel(
        "step",
        Inputs::one("x", x.clone()),
        &[alpha],
        Some(zero_grad),
        move |dev, _save| {
            let storage = B::step(input.storage(), alpha)?;
            Ok(Tensor::from_storage(
                storage,
                input.shape().clone(),
                dev.clone(),
            ))
        },
    )
}

// Exponential and logarithm family

/// Element-wise exponential: `e^x`.
///
/// Saves the forward output: `d(e^x) = dy * y`, so the backward pass reuses
/// y instead of recomputing the exponential.
pub fn exp<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || ctx.dy.mul(ctx.saved_value(0)?))
    }
    dispatch_unary_saving(engine, "exp", UnaryOp::Exp, x, Some(rule))
}

/// Element-wise `e^x - 1`, accurate near zero.
pub fn expm1<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.mul(&x.exp()?)
        })
    }
    dispatch_unary(engine, "expm1", UnaryOp::Expm1, x, Some(rule))
}

/// Element-wise natural logarithm.
pub fn log<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.div(&x)
        })
    }
    dispatch_unary(engine, "log", UnaryOp::Log, x, Some(rule))
}

/// Element-wise `ln(1 + x)`, accurate near zero.
pub fn log1p<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.div(&x.affine(1.0, 1.0)?)
        })
    }
    dispatch_unary(engine, "log1p", UnaryOp::Log1p, x, Some(rule))
}

/// Element-wise square root.
pub fn sqrt<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(√x) = dy / (2√x)
            let x = ctx.input_cast("x")?;
            ctx.dy.div(&x.sqrt()?.affine(2.0, 0.0)?)
        })
    }
    dispatch_unary(engine, "sqrt", UnaryOp::Sqrt, x, Some(rule))
}

/// Element-wise reciprocal square root: `1 / √x`.
pub fn rsqrt<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(x^-1/2) = -dy / (2 * x^3/2)
            let x = ctx.input_cast("x")?;
            let denom = x.mul(&x.sqrt()?)?.affine(2.0, 0.0)?;
            ctx.dy.neg()?.div(&denom)
        })
    }
    dispatch_unary(engine, "rsqrt", UnaryOp::Rsqrt, x, Some(rule))
}

// Sigmoid family

/// Element-wise sigmoid: `1 / (1 + e^-x)`.
///
/// Saves the forward output: `d(σ(x)) = dy * y * (1 - y)`.
pub fn sigmoid<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let y = ctx.saved_value(0)?;
            let one_minus = Tensor::ones_like(y)?.sub(y)?;
            ctx.dy.mul(y)?.mul(&one_minus)
        })
    }
    dispatch_unary_saving(engine, "sigmoid", UnaryOp::Sigmoid, x, Some(rule))
}

/// Element-wise log-sigmoid, computed by the backend as `-softplus(-x)`
/// for numerical stability.
pub fn log_sigmoid<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.mul(&x.neg()?.sigmoid()?)
        })
    }
    dispatch_unary(engine, "logSigmoid", UnaryOp::LogSigmoid, x, Some(rule))
}

/// Element-wise softplus: `ln(e^x + 1)`.
pub fn softplus<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.mul(&x.sigmoid()?)
        })
    }
    dispatch_unary(engine, "softplus", UnaryOp::Softplus, x, Some(rule))
}

// Trigonometric

/// Element-wise sine.
pub fn sin<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.mul(&x.unary(UnaryOp::Cos)?)
        })
    }
    dispatch_unary(engine, "sin", UnaryOp::Sin, x, Some(rule))
}

/// Element-wise cosine.
pub fn cos<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.mul(&x.unary(UnaryOp::Sin)?.neg()?)
        })
    }
    dispatch_unary(engine, "cos", UnaryOp::Cos, x, Some(rule))
}

/// Element-wise tangent.
pub fn tan<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(tan x) = dy / cos²x
            let x = ctx.input_cast("x")?;
            ctx.dy.div(&x.unary(UnaryOp::Cos)?.square()?)
        })
    }
    dispatch_unary(engine, "tan", UnaryOp::Tan, x, Some(rule))
}

/// Element-wise arcsine. NaN outside [-1, 1].
pub fn asin<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(asin x) = dy / √(1 - x²)
            let x = ctx.input_cast("x")?;
            let denom = Tensor::ones_like(&x)?.sub(&x.square()?)?.sqrt()?;
            ctx.dy.div(&denom)
        })
    }
    dispatch_unary(engine, "asin", UnaryOp::Asin, x, Some(rule))
}

/// Element-wise arccosine. NaN outside [-1, 1].
pub fn acos<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(acos x) = -dy / √(1 - x²)
            let x = ctx.input_cast("x")?;
            let denom = Tensor::ones_like(&x)?.sub(&x.square()?)?.sqrt()?;
            ctx.dy.neg()?.div(&denom)
        })
    }
    dispatch_unary(engine, "acos", UnaryOp::Acos, x, Some(rule))
}

/// Element-wise arctangent.
pub fn atan<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(atan x) = dy / (1 + x²)
            let x = ctx.input_cast("x")?;
            ctx.dy.div(&x.square()?.affine(1.0, 1.0)?)
        })
    }
    dispatch_unary(engine, "atan", UnaryOp::Atan, x, Some(rule))
}

// Hyperbolic

/// Element-wise hyperbolic sine.
pub fn sinh<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.mul(&x.unary(UnaryOp::Cosh)?)
        })
    }
    dispatch_unary(engine, "sinh", UnaryOp::Sinh, x, Some(rule))
}

/// Element-wise hyperbolic cosine.
pub fn cosh<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let x = ctx.input_cast("x")?;
            ctx.dy.mul(&x.unary(UnaryOp::Sinh)?)
        })
    }
    dispatch_unary(engine, "cosh", UnaryOp::Cosh, x, Some(rule))
}

/// Element-wise hyperbolic tangent.
///
/// Saves the forward output: `d(tanh x) = dy * (1 - y²)`.
pub fn tanh<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            let y = ctx.saved_value(0)?;
            let one_minus_sq = Tensor::ones_like(y)?.sub(&y.square()?)?;
            ctx.dy.mul(&one_minus_sq)
        })
    }
    dispatch_unary_saving(engine, "tanh", UnaryOp::Tanh, x, Some(rule))
}

/// Element-wise inverse hyperbolic sine.
pub fn asinh<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(asinh x) = dy / √(1 + x²)
            let x = ctx.input_cast("x")?;
            ctx.dy.div(&x.square()?.affine(1.0, 1.0)?.sqrt()?)
        })
    }
    dispatch_unary(engine, "asinh", UnaryOp::Asinh, x, Some(rule))
}

/// Element-wise inverse hyperbolic cosine. NaN below 1.
pub fn acosh<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(acosh x) = dy / √(x² - 1)
            let x = ctx.input_cast("x")?;
            ctx.dy.div(&x.square()?.affine(1.0, -1.0)?.sqrt()?)
        })
    }
    dispatch_unary(engine, "acosh", UnaryOp::Acosh, x, Some(rule))
}

/// Element-wise inverse hyperbolic tangent. NaN outside (-1, 1).
pub fn atanh<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(atanh x) = dy / (1 - x²)
            let x = ctx.input_cast("x")?;
            let denom = Tensor::ones_like(&x)?.sub(&x.square()?)?;
            ctx.dy.div(&denom)
        })
    }
    dispatch_unary(engine, "atanh", UnaryOp::Atanh, x, Some(rule))
}

// Error function

/// Element-wise Gauss error function.
///
/// Accepts floating and integer dtypes; integer input is promoted to F32
/// before dispatch (so the recorded input is the promoted tensor). Any
/// other dtype fails with an unsupported-dtype error before the kernel
/// runs.
pub fn erf<B: Backend>(engine: &Engine<B>, x: &Tensor<B>) -> Result<Tensor<B>> {
    let dtype = x.dtype();
    if !(dtype.is_float() || dtype.is_int()) {
        return Err(Error::UnsupportedDType { op: "erf", dtype });
    }
    let x = if dtype.is_int() {
        x.to_dtype(DType::F32)?
    } else {
        x.clone()
    };
    fn rule<'a, B: Backend>(ctx: &'a GradContext<'a, B>) -> InputGrads<'a, B> {
        InputGrads::new().with("x", move || {
            // d(erf x) = dy * (2/√π) * e^(-x²)
            let x = ctx.input_cast("x")?;
            let g = x
                .square()?
                .neg()?
                .exp()?
                .affine(std::f64::consts::FRAC_2_SQRT_PI, 0.0)?;
            ctx.dy.mul(&g)
        })
    }
    dispatch_unary(engine, "erf", UnaryOp::Erf, &x, Some(rule))
}
