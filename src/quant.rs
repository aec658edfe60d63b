//! Fixed-point quantization arithmetic.
//!
//! Integer-only replacements for floating-point scale multiplication. Every
//! routine here is a pure function and bit-reproducible across platforms:
//! the multiplier decomposition works on the raw f64 bit pattern instead of
//! libm, and the rounding helpers use the exact nudge/threshold arithmetic
//! the offline quantizer was calibrated against.

use crate::dtype::{ActivationKind, DType, QuantParams};
use crate::status::{Result, Status};

/// Decompose `x` into `(fraction, exponent)` with `fraction` in
/// `[0.5, 1)` and `fraction * 2^exponent == x`. Bit-exact, no libm.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let exp_field = ((bits >> 52) & 0x7ff) as i32;
    if exp_field == 0 {
        // Subnormal: renormalize through a 2^64 scale.
        let (fraction, exponent) = frexp(x * f64::from_bits(0x43F0_0000_0000_0000));
        return (fraction, exponent - 64);
    }
    let exponent = exp_field - 1022;
    let fraction_bits = (bits & !(0x7ffu64 << 52)) | (1022u64 << 52);
    (f64::from_bits(fraction_bits), exponent)
}

/// Decompose a non-negative real multiplier into a normalized 32-bit
/// fixed-point multiplier in `[2^30, 2^31)` and a power-of-two shift such
/// that `multiplier * 2^(shift - 31)` reproduces the real value to within
/// one part in 2^30. Zero maps to `(0, 0)`; shifts below -31 flush to zero
/// and multipliers of 2^30 or more do not fit the representation and are
/// rejected, so an untrusted scale combination cannot drive the integer
/// shift past 32 bits downstream.
pub fn quantize_multiplier(real: f64) -> Result<(i32, i32)> {
    if real == 0.0 {
        return Ok((0, 0));
    }
    if !real.is_finite() || real < 0.0 {
        return Err(Status::invalid_argument(format!(
            "multiplier must be a non-negative finite real, got {real}"
        )));
    }
    let (fraction, mut shift) = frexp(real);
    let mut fixed = (fraction * (1i64 << 31) as f64).round() as i64;
    if fixed == 1i64 << 31 {
        fixed /= 2;
        shift += 1;
    }
    if shift < -31 {
        return Ok((0, 0));
    }
    if shift > 30 {
        return Err(Status::invalid_argument(format!(
            "multiplier {real} is too large for 32-bit fixed point"
        )));
    }
    Ok((fixed as i32, shift))
}

/// Variant for multipliers known to be in `(0, 1)`: the returned shift is
/// always <= 0. A value that rounds up to exactly 1.0 saturates the
/// multiplier instead of producing a positive shift.
pub fn quantize_multiplier_smaller_than_one(real: f64) -> Result<(i32, i32)> {
    if !(real > 0.0 && real < 1.0) {
        return Err(Status::invalid_argument(format!(
            "multiplier must be in (0, 1), got {real}"
        )));
    }
    let (multiplier, shift) = quantize_multiplier(real)?;
    if shift > 0 {
        return Ok((i32::MAX, 0));
    }
    Ok((multiplier, shift))
}

/// Doubling high multiply with round-to-nearest, saturating on the single
/// overflow case `MIN * MIN`.
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let product = a as i64 * b as i64;
    let nudge = if product >= 0 { 1i64 << 30 } else { 1 - (1i64 << 30) };
    // Truncating division, not a shift: the nudge is calibrated for
    // round-toward-zero on negative products.
    ((product + nudge) / (1i64 << 31)) as i32
}

/// Divide by `2^exponent` rounding to nearest, ties away from zero.
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    debug_assert!((0..=31).contains(&exponent));
    let mask = (1i64 << exponent) - 1;
    let remainder = x as i64 & mask;
    let threshold = (mask >> 1) + i64::from(x < 0);
    (x >> exponent) + i32::from(remainder > threshold)
}

/// `x * multiplier * 2^(shift - 31)` in integer arithmetic; `shift` may be
/// positive or negative.
pub fn multiply_by_quantized_multiplier(x: i32, multiplier: i32, shift: i32) -> i32 {
    let left_shift = shift.max(0);
    let right_shift = (-shift).max(0);
    rounding_divide_by_pot(
        saturating_rounding_doubling_high_mul(x << left_shift, multiplier),
        right_shift,
    )
}

/// Specialization for multipliers produced by
/// [`quantize_multiplier_smaller_than_one`], where `left_shift <= 0`.
pub fn multiply_by_quantized_multiplier_smaller_than_one(
    x: i32,
    multiplier: i32,
    left_shift: i32,
) -> i32 {
    rounding_divide_by_pot(saturating_rounding_doubling_high_mul(x, multiplier), -left_shift)
}

/// Precomputed integer parameters for a quantized elementwise binary
/// operator. The constants follow the offline quantizer exactly: inputs are
/// rescaled against `2 * max(scale1, scale2)` and the pre-shift is 15 bits
/// for 16-bit output, 20 otherwise. Downstream numeric fixtures depend on
/// these being bit-exact.
#[derive(Debug, Clone, Copy)]
pub struct ArithmeticParams {
    pub left_shift: i32,
    pub input1_offset: i32,
    pub input1_multiplier: i32,
    pub input1_shift: i32,
    pub input2_offset: i32,
    pub input2_multiplier: i32,
    pub input2_shift: i32,
    pub output_offset: i32,
    pub output_multiplier: i32,
    pub output_shift: i32,
    pub activation_min: i32,
    pub activation_max: i32,
}

impl ArithmeticParams {
    pub fn for_binary_op(
        input1: &QuantParams,
        input2: &QuantParams,
        output: &QuantParams,
        output_dtype: DType,
        activation: ActivationKind,
    ) -> Result<Self> {
        let scale1 = input1.scale()? as f64;
        let scale2 = input2.scale()? as f64;
        let output_scale = output.scale()? as f64;
        if scale1 <= 0.0 || scale2 <= 0.0 || output_scale <= 0.0 {
            return Err(Status::invalid_argument(
                "quantized arithmetic requires strictly positive scales",
            ));
        }

        let left_shift = if output_dtype == DType::I16 { 15 } else { 20 };
        let twice_max_input_scale = 2.0 * scale1.max(scale2);
        let real_input1_multiplier = scale1 / twice_max_input_scale;
        let real_input2_multiplier = scale2 / twice_max_input_scale;
        let real_output_multiplier =
            twice_max_input_scale / ((1i64 << left_shift) as f64 * output_scale);

        let (input1_multiplier, input1_shift) =
            quantize_multiplier_smaller_than_one(real_input1_multiplier)?;
        let (input2_multiplier, input2_shift) =
            quantize_multiplier_smaller_than_one(real_input2_multiplier)?;
        let (output_multiplier, output_shift) =
            quantize_multiplier_smaller_than_one(real_output_multiplier)?;

        let (activation_min, activation_max) = activation_range_quantized(
            activation,
            output.zero_point()?,
            output.scale()?,
            output_dtype,
        )?;

        Ok(Self {
            left_shift,
            input1_offset: -input1.zero_point()?,
            input1_multiplier,
            input1_shift,
            input2_offset: -input2.zero_point()?,
            input2_multiplier,
            input2_shift,
            output_offset: output.zero_point()?,
            output_multiplier,
            output_shift,
            activation_min,
            activation_max,
        })
    }

    /// Rescale one pre-shifted input into the common accumulation domain.
    pub fn scale_input1(&self, value: i32) -> i32 {
        let shifted = (value + self.input1_offset) << self.left_shift;
        multiply_by_quantized_multiplier_smaller_than_one(
            shifted,
            self.input1_multiplier,
            self.input1_shift,
        )
    }

    pub fn scale_input2(&self, value: i32) -> i32 {
        let shifted = (value + self.input2_offset) << self.left_shift;
        multiply_by_quantized_multiplier_smaller_than_one(
            shifted,
            self.input2_multiplier,
            self.input2_shift,
        )
    }

    /// Rescale a raw accumulated sum/difference into the output domain and
    /// clamp it against the fused activation range.
    pub fn rescale_output(&self, raw: i32) -> i32 {
        let out = multiply_by_quantized_multiplier_smaller_than_one(
            raw,
            self.output_multiplier,
            self.output_shift,
        ) + self.output_offset;
        out.clamp(self.activation_min, self.activation_max)
    }
}

fn quantized_bounds(dtype: DType) -> Result<(i32, i32)> {
    match dtype {
        DType::I8 => Ok((i8::MIN as i32, i8::MAX as i32)),
        DType::I16 => Ok((i16::MIN as i32, i16::MAX as i32)),
        other => Err(Status::unsupported_type(format!(
            "no quantized range for {other:?}"
        ))),
    }
}

/// Map a symbolic activation kind plus the output quantization into a
/// concrete clamped integer range applied post-accumulation.
pub fn activation_range_quantized(
    activation: ActivationKind,
    zero_point: i32,
    scale: f32,
    dtype: DType,
) -> Result<(i32, i32)> {
    let (qmin, qmax) = quantized_bounds(dtype)?;
    if scale <= 0.0 {
        return Err(Status::invalid_argument(
            "quantized activation range requires a positive scale",
        ));
    }
    let quantize = |real: f32| zero_point + (real / scale).round() as i32;
    let (min, max) = match activation {
        ActivationKind::None => (qmin, qmax),
        ActivationKind::Relu => (quantize(0.0), qmax),
        ActivationKind::ReluN1To1 => (quantize(-1.0), quantize(1.0)),
        ActivationKind::Relu6 => (quantize(0.0), quantize(6.0)),
    };
    Ok((min.clamp(qmin, qmax), max.clamp(qmin, qmax)))
}

/// Float activation clamp range.
pub fn activation_range(activation: ActivationKind) -> (f32, f32) {
    match activation {
        ActivationKind::None => (f32::NEG_INFINITY, f32::INFINITY),
        ActivationKind::Relu => (0.0, f32::INFINITY),
        ActivationKind::ReluN1To1 => (-1.0, 1.0),
        ActivationKind::Relu6 => (0.0, 6.0),
    }
}

/// Integer activation clamp range for non-quantized integer arithmetic.
pub fn activation_range_int(activation: ActivationKind) -> (i64, i64) {
    match activation {
        ActivationKind::None => (i64::MIN, i64::MAX),
        ActivationKind::Relu => (0, i64::MAX),
        ActivationKind::ReluN1To1 => (-1, 1),
        ActivationKind::Relu6 => (0, 6),
    }
}
