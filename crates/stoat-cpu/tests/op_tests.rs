// Forward-semantics tests for the elementwise operation catalogue,
// exercised through the engine on the CPU backend.

use stoat_core::{ops, DType, Engine, Error};
use stoat_cpu::{CpuBackend, CpuDevice, CpuTensor};

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

fn engine() -> Engine<CpuBackend> {
    Engine::new(CpuDevice)
}

fn t64(data: &[f64]) -> CpuTensor {
    CpuTensor::from_f64_slice(data, data.len(), DType::F64, &CpuDevice).unwrap()
}

// Basic arithmetic

#[test]
fn test_neg_involution() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-1.5, 0.0, 2.25, 1e10]);
    let back = ops::neg(&eng, &ops::neg(&eng, &x)?)?;
    assert_vec_approx(&back.to_f64_vec()?, &x.to_f64_vec()?, 1e-12);
    Ok(())
}

#[test]
fn test_abs_nonnegative() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-3.0, -0.5, 0.0, 0.5, 3.0]);
    let y = ops::abs(&eng, &x)?;
    for v in y.to_f64_vec()? {
        assert!(v >= 0.0);
    }
    assert_vec_approx(&y.to_f64_vec()?, &[3.0, 0.5, 0.0, 0.5, 3.0], 1e-12);
    Ok(())
}

#[test]
fn test_sign_values() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-7.5, -0.1, 0.0, 0.1, 42.0]);
    let y = ops::sign(&eng, &x)?.to_f64_vec()?;
    assert_eq!(y, vec![-1.0, -1.0, 0.0, 1.0, 1.0]);
    for v in &y {
        assert!([-1.0, 0.0, 1.0].contains(v));
    }
    Ok(())
}

#[test]
fn test_ceil_floor_concrete() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[0.6, 1.1, -3.3]);
    assert_vec_approx(&ops::ceil(&eng, &x)?.to_f64_vec()?, &[1.0, 2.0, -3.0], 1e-12);
    assert_vec_approx(&ops::floor(&eng, &x)?.to_f64_vec()?, &[0.0, 1.0, -4.0], 1e-12);
    Ok(())
}

#[test]
fn test_round_half_to_even() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[0.5, 1.5, 2.5, -0.5, -1.5, 3.5, 2.4, 2.6]);
    let y = ops::round(&eng, &x)?.to_f64_vec()?;
    assert_eq!(y, vec![0.0, 2.0, 2.0, 0.0, -2.0, 4.0, 2.0, 3.0]);
    Ok(())
}

#[test]
fn test_square_and_reciprocal() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[0.5, -2.0, 4.0]);
    assert_vec_approx(&ops::square(&eng, &x)?.to_f64_vec()?, &[0.25, 4.0, 16.0], 1e-12);
    assert_vec_approx(
        &ops::reciprocal(&eng, &x)?.to_f64_vec()?,
        &[2.0, -0.5, 0.25],
        1e-12,
    );
    Ok(())
}

#[test]
fn test_square_int_stays_int() -> stoat_core::Result<()> {
    let eng = engine();
    let x = CpuTensor::from_slice(&[-3i32, 0, 4], 3, &CpuDevice)?;
    let y = ops::square(&eng, &x)?;
    assert_eq!(y.dtype(), DType::I32);
    assert_eq!(y.to_f64_vec()?, vec![9.0, 0.0, 16.0]);
    Ok(())
}

// Clip

#[test]
fn test_clip_concrete() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-1.0, 2.0, -3.0, 4.0]);
    let y = ops::clip_by_value(&eng, &x, -2.0, 3.0)?.to_f64_vec()?;
    assert_eq!(y, vec![-1.0, 2.0, -3.0, 3.0]);
    for v in &y {
        assert!((-2.0..=3.0).contains(v));
    }
    Ok(())
}

#[test]
fn test_clip_invalid_bounds() {
    let eng = engine();
    let x = t64(&[1.0]);
    let err = ops::clip_by_value(&eng, &x, 2.0, -2.0).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { op: "clipByValue", .. }));
}

// Step

#[test]
fn test_step_default_alpha() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-2.0, 0.0, 3.0]);
    assert_eq!(ops::step(&eng, &x, 0.0)?.to_f64_vec()?, vec![0.0, 0.0, 1.0]);
    Ok(())
}

#[test]
fn test_step_negative_slope() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-2.0, -0.5, 0.0, 3.0]);
    assert_vec_approx(
        &ops::step(&eng, &x, 0.5)?.to_f64_vec()?,
        &[-1.0, -0.25, 0.0, 1.0],
        1e-12,
    );
    Ok(())
}

// Exponential / logarithm family

#[test]
fn test_exp_log_roundtrip() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[0.01, 0.5, 1.0, 7.0, 123.456]);
    let back = ops::exp(&eng, &ops::log(&eng, &x)?)?;
    for (got, want) in back.to_f64_vec()?.iter().zip(x.to_f64_vec()?.iter()) {
        assert!(approx_eq(*got, *want, 1e-9 * want.abs().max(1.0)));
    }
    Ok(())
}

#[test]
fn test_expm1_log1p_near_zero() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[1e-10, -1e-10]);
    // The naive formulations lose all precision here.
    assert_vec_approx(&ops::expm1(&eng, &x)?.to_f64_vec()?, &[1e-10, -1e-10], 1e-20);
    assert_vec_approx(&ops::log1p(&eng, &x)?.to_f64_vec()?, &[1e-10, -1e-10], 1e-20);
    Ok(())
}

#[test]
fn test_sqrt_rsqrt() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[4.0, 0.25, 9.0]);
    assert_vec_approx(&ops::sqrt(&eng, &x)?.to_f64_vec()?, &[2.0, 0.5, 3.0], 1e-12);
    assert_vec_approx(
        &ops::rsqrt(&eng, &x)?.to_f64_vec()?,
        &[0.5, 2.0, 1.0 / 3.0],
        1e-12,
    );
    Ok(())
}

#[test]
fn test_log_int_promotes_to_float() -> stoat_core::Result<()> {
    let eng = engine();
    let x = CpuTensor::from_slice(&[1i32, 2, 8], 3, &CpuDevice)?;
    let y = ops::log(&eng, &x)?;
    assert_eq!(y.dtype(), DType::F32);
    assert_vec_approx(&y.to_f64_vec()?, &[0.0, 2f64.ln(), 8f64.ln()], 1e-6);
    Ok(())
}

// Sigmoid family

#[test]
fn test_sigmoid_at_zero_and_range() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-50.0, -1.0, 0.0, 1.0, 50.0]);
    let y = ops::sigmoid(&eng, &x)?.to_f64_vec()?;
    assert_eq!(y[2], 0.5); // exact at zero
    for v in &y {
        assert!(*v > 0.0 && *v < 1.0);
    }
    Ok(())
}

#[test]
fn test_sigmoid_extreme_inputs_stay_finite() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-1000.0, 1000.0]);
    let y = ops::sigmoid(&eng, &x)?.to_f64_vec()?;
    assert!(approx_eq(y[0], 0.0, 1e-12));
    assert!(approx_eq(y[1], 1.0, 1e-12));
    Ok(())
}

#[test]
fn test_softplus_stability() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-1000.0, 0.0, 1000.0]);
    let y = ops::softplus(&eng, &x)?.to_f64_vec()?;
    assert!(approx_eq(y[0], 0.0, 1e-12));
    assert!(approx_eq(y[1], 2f64.ln(), 1e-12));
    assert!(approx_eq(y[2], 1000.0, 1e-9));
    Ok(())
}

#[test]
fn test_log_sigmoid_stability() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-1000.0, 0.0, 20.0]);
    let y = ops::log_sigmoid(&eng, &x)?.to_f64_vec()?;
    // ln σ(-1000) = -1000 - ln(1 + e^-1000) ≈ -1000: the naive form
    // underflows σ to 0 and yields -inf instead.
    assert!(approx_eq(y[0], -1000.0, 1e-9));
    assert!(approx_eq(y[1], -(2f64.ln()), 1e-12));
    assert!(y[2] < 0.0 && y[2] > -1e-8);
    Ok(())
}

// Hyperbolic round-trips

#[test]
fn test_sinh_asinh_roundtrip() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-3.0, -0.5, 0.0, 0.5, 3.0]);
    let back = ops::sinh(&eng, &ops::asinh(&eng, &x)?)?;
    assert_vec_approx(&back.to_f64_vec()?, &x.to_f64_vec()?, 1e-10);
    Ok(())
}

#[test]
fn test_cosh_acosh_roundtrip() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[1.0, 1.5, 2.0, 10.0]);
    let back = ops::cosh(&eng, &ops::acosh(&eng, &x)?)?;
    assert_vec_approx(&back.to_f64_vec()?, &x.to_f64_vec()?, 1e-9);
    Ok(())
}

#[test]
fn test_tanh_atanh_roundtrip() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[-0.9, -0.25, 0.0, 0.25, 0.9]);
    let back = ops::tanh(&eng, &ops::atanh(&eng, &x)?)?;
    assert_vec_approx(&back.to_f64_vec()?, &x.to_f64_vec()?, 1e-10);
    Ok(())
}

// Error function

#[test]
fn test_erf_known_values() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[0.0, 1.0, -1.0]);
    let y = ops::erf(&eng, &x)?.to_f64_vec()?;
    assert!(approx_eq(y[0], 0.0, 1e-12));
    assert!(approx_eq(y[1], 0.8427007929497149, 1e-10));
    assert!(approx_eq(y[2], -0.8427007929497149, 1e-10));
    Ok(())
}

#[test]
fn test_erf_int_input_promotes() -> stoat_core::Result<()> {
    let eng = engine();
    let x = CpuTensor::from_slice(&[0i32, 1, -1], 3, &CpuDevice)?;
    let y = ops::erf(&eng, &x)?;
    assert_eq!(y.dtype(), DType::F32);
    assert!(approx_eq(y.to_f64_vec()?[1], 0.8427007929497149, 1e-6));
    Ok(())
}

#[test]
fn test_erf_bool_input_fails() {
    let eng = engine();
    let x = CpuTensor::from_slice(&[0u8, 1], 2, &CpuDevice).unwrap();
    let err = ops::erf(&eng, &x).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedDType { op: "erf", dtype: DType::U8 }
    ));
}

// NaN policy

#[test]
fn test_nan_propagates() -> stoat_core::Result<()> {
    let eng = engine();
    let x = t64(&[f64::NAN, 1.0]);
    assert!(ops::exp(&eng, &x)?.to_f64_vec()?[0].is_nan());
    assert!(ops::clip_by_value(&eng, &x, 0.0, 2.0)?.to_f64_vec()?[0].is_nan());
    assert!(ops::step(&eng, &x, 0.5)?.to_f64_vec()?[0].is_nan());
    assert!(ops::sign(&eng, &x)?.to_f64_vec()?[0].is_nan());
    Ok(())
}

#[test]
fn test_out_of_domain_is_nan() -> stoat_core::Result<()> {
    let eng = engine();
    assert!(ops::log(&eng, &t64(&[-1.0]))?.to_f64_vec()?[0].is_nan());
    assert!(ops::sqrt(&eng, &t64(&[-4.0]))?.to_f64_vec()?[0].is_nan());
    assert!(ops::asin(&eng, &t64(&[1.5]))?.to_f64_vec()?[0].is_nan());
    assert!(ops::acosh(&eng, &t64(&[0.5]))?.to_f64_vec()?[0].is_nan());
    Ok(())
}

// Registry surface

#[test]
fn test_registry_names() {
    use stoat_core::registry;
    for name in ["neg", "clipByValue", "logSigmoid", "erf", "step"] {
        assert!(registry::lookup(name).is_some(), "missing op name {name}");
    }
    assert_eq!(registry::all().len(), 32);
}
