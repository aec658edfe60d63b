use anyhow::Result;
use microinfer::{
    multiply_by_quantized_multiplier, quantize_multiplier, quantize_multiplier_smaller_than_one,
    rounding_divide_by_pot, saturating_rounding_doubling_high_mul, Status,
};

#[test]
fn multiplier_decomposition_is_normalized() -> Result<()> {
    for &real in &[1e-6f64, 0.003, 0.25, 0.3, 0.9999, 1.0, 7.5, 1024.0, 123456.789] {
        let (multiplier, shift) = quantize_multiplier(real)?;
        assert!(
            (1i32 << 30..=i32::MAX).contains(&multiplier),
            "{real}: multiplier {multiplier} out of [2^30, 2^31)"
        );
        let reconstructed = multiplier as f64 * 2f64.powi(shift - 31);
        let relative = (reconstructed - real).abs() / real;
        assert!(
            relative <= 1.0 / (1u64 << 30) as f64,
            "{real}: reconstructed {reconstructed}, relative error {relative}"
        );
    }
    Ok(())
}

#[test]
fn multiplier_edge_values() -> Result<()> {
    assert_eq!(quantize_multiplier(0.0)?, (0, 0));
    assert_eq!(quantize_multiplier(1.0)?, (1 << 30, 1));
    // Shifts below -31 flush to zero.
    assert_eq!(quantize_multiplier(1e-20)?, (0, 0));
    assert!(matches!(
        quantize_multiplier(-0.5),
        Err(Status::InvalidArgument(_))
    ));
    assert!(matches!(
        quantize_multiplier(f64::NAN),
        Err(Status::InvalidArgument(_))
    ));
    // Values of 2^30 and up need a shift past 30 and are rejected rather
    // than wrapped into an overlong integer shift.
    assert!(matches!(
        quantize_multiplier((1u64 << 30) as f64),
        Err(Status::InvalidArgument(_))
    ));
    assert!(matches!(
        quantize_multiplier(3e30),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn smaller_than_one_never_shifts_left() -> Result<()> {
    assert_eq!(quantize_multiplier_smaller_than_one(0.5)?, (1 << 30, 0));
    for &real in &[1e-4f64, 0.1, 0.42, 0.875] {
        let (_, shift) = quantize_multiplier_smaller_than_one(real)?;
        assert!(shift <= 0, "{real}: shift {shift} is positive");
    }
    // A value that rounds up to 1.0 saturates rather than shifting left.
    assert_eq!(quantize_multiplier_smaller_than_one(1.0 - 1e-12)?, (i32::MAX, 0));
    assert!(matches!(
        quantize_multiplier_smaller_than_one(1.0),
        Err(Status::InvalidArgument(_))
    ));
    assert!(matches!(
        quantize_multiplier_smaller_than_one(0.0),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn doubling_high_mul_rounds_and_saturates() {
    // 0.5 * 0.5 in Q31 is 0.25.
    assert_eq!(
        saturating_rounding_doubling_high_mul(1 << 30, 1 << 30),
        1 << 29
    );
    // Half a unit rounds up.
    assert_eq!(saturating_rounding_doubling_high_mul(1, 1 << 30), 1);
    assert_eq!(saturating_rounding_doubling_high_mul(0, i32::MAX), 0);
    // The single overflowing product clamps to MAX.
    assert_eq!(
        saturating_rounding_doubling_high_mul(i32::MIN, i32::MIN),
        i32::MAX
    );
    assert_eq!(
        saturating_rounding_doubling_high_mul(i32::MIN, 1 << 30),
        -(1 << 30)
    );
}

#[test]
fn divide_by_pot_rounds_ties_away_from_zero() {
    assert_eq!(rounding_divide_by_pot(7, 1), 4);
    assert_eq!(rounding_divide_by_pot(-7, 1), -4);
    assert_eq!(rounding_divide_by_pot(5, 2), 1);
    assert_eq!(rounding_divide_by_pot(-5, 2), -1);
    assert_eq!(rounding_divide_by_pot(6, 2), 2);
    assert_eq!(rounding_divide_by_pot(-6, 2), -2);
    assert_eq!(rounding_divide_by_pot(1023, 0), 1023);
}

#[test]
fn quantized_multiply_tracks_the_real_product() -> Result<()> {
    for &real in &[0.0003f64, 0.05, 0.3, 0.75, 2.5, 40.0] {
        let (multiplier, shift) = quantize_multiplier(real)?;
        for &x in &[-100_000i32, -1000, -1, 0, 1, 1000, 100_000] {
            let got = multiply_by_quantized_multiplier(x, multiplier, shift);
            let want = (x as f64 * real).round();
            assert!(
                (got as f64 - want).abs() <= 1.0,
                "{x} * {real}: got {got}, expected about {want}"
            );
        }
    }
    Ok(())
}
