//! Elementwise Add, Sub, and Mul with broadcasting and fused activation.

use crate::dtype::{ActivationKind, DType};
use crate::model::OpOptions;
#[cfg(feature = "float")]
use crate::quant::activation_range;
use crate::quant::activation_range_int;
#[cfg(feature = "quant")]
use crate::quant::{
    activation_range_quantized, multiply_by_quantized_multiplier, quantize_multiplier,
    ArithmeticParams,
};
use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::common::map_binary;
use super::{cast_in, cast_out, configure_broadcast_binary, Exec, KernelDef, OpInfo};

pub const ADD: KernelDef = KernelDef {
    configure: configure_arithmetic,
    execute: Exec::Kernel(|info, io| execute_arithmetic(info, io, ArithKind::Add)),
};

pub const SUB: KernelDef = KernelDef {
    configure: configure_arithmetic,
    execute: Exec::Kernel(|info, io| execute_arithmetic(info, io, ArithKind::Sub)),
};

pub const MUL: KernelDef = KernelDef {
    configure: configure_arithmetic,
    execute: Exec::Kernel(|info, io| execute_arithmetic(info, io, ArithKind::Mul)),
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum ArithKind {
    Add,
    Sub,
    Mul,
}

fn configure_arithmetic(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    configure_broadcast_binary(interp, graph, op)
}

fn activation_of(info: &OpInfo<'_>) -> Result<ActivationKind> {
    match info.options() {
        OpOptions::Arithmetic { activation } => Ok(*activation),
        _ => Err(Status::unknown("arithmetic operator without arithmetic options")),
    }
}

fn execute_arithmetic(info: &OpInfo<'_>, io: &mut KernelIo<'_>, kind: ArithKind) -> Result<()> {
    let a_def = info.input_def(0)?;
    let b_def = info.input_def(1)?;
    let activation = activation_of(info)?;

    match a_def.dtype {
        #[cfg(feature = "float")]
        DType::F32 => {
            let (min, max) = activation_range(activation);
            let a = cast_in::<f32>(io.inputs[0])?;
            let b = cast_in::<f32>(io.inputs[1])?;
            let out = cast_out::<f32>(&mut *io.outputs[0])?;
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                let v = match kind {
                    ArithKind::Add => x + y,
                    ArithKind::Sub => x - y,
                    ArithKind::Mul => x * y,
                };
                v.clamp(min, max)
            })
        }
        DType::I32 => {
            let (lo, hi) = i32_range(activation);
            let a = cast_in::<i32>(io.inputs[0])?;
            let b = cast_in::<i32>(io.inputs[1])?;
            let out = cast_out::<i32>(&mut *io.outputs[0])?;
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                let v = match kind {
                    ArithKind::Add => (x as i64) + (y as i64),
                    ArithKind::Sub => (x as i64) - (y as i64),
                    ArithKind::Mul => (x as i64).wrapping_mul(y as i64),
                };
                v.clamp(lo, hi) as i32
            })
        }
        DType::I64 => {
            let (lo, hi) = activation_range_int(activation);
            let a = cast_in::<i64>(io.inputs[0])?;
            let b = cast_in::<i64>(io.inputs[1])?;
            let out = cast_out::<i64>(&mut *io.outputs[0])?;
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                let v = match kind {
                    ArithKind::Add => x.wrapping_add(y),
                    ArithKind::Sub => x.wrapping_sub(y),
                    ArithKind::Mul => x.wrapping_mul(y),
                };
                v.clamp(lo, hi)
            })
        }
        #[cfg(feature = "quant")]
        DType::I8 => execute_quantized_i8(info, io, kind, activation),
        other => Err(Status::unsupported_type(format!(
            "{name} not supported for {other:?}",
            name = kind.name()
        ))),
    }
}

impl ArithKind {
    fn name(self) -> &'static str {
        match self {
            ArithKind::Add => "Add",
            ArithKind::Sub => "Sub",
            ArithKind::Mul => "Mul",
        }
    }
}

// Activation range narrowed to what an i32 result can hold.
fn i32_range(activation: ActivationKind) -> (i64, i64) {
    let (lo, hi) = activation_range_int(activation);
    (lo.max(i32::MIN as i64), hi.min(i32::MAX as i64))
}

#[cfg(feature = "quant")]
fn execute_quantized_i8(
    info: &OpInfo<'_>,
    io: &mut KernelIo<'_>,
    kind: ArithKind,
    activation: ActivationKind,
) -> Result<()> {
    let a_def = info.input_def(0)?;
    let b_def = info.input_def(1)?;
    let out_def = info.output_def(0)?;
    let qa = a_def
        .quant
        .as_ref()
        .ok_or_else(|| Status::invalid_argument("quantized input without parameters"))?;
    let qb = b_def
        .quant
        .as_ref()
        .ok_or_else(|| Status::invalid_argument("quantized input without parameters"))?;
    let qo = out_def
        .quant
        .as_ref()
        .ok_or_else(|| Status::invalid_argument("quantized output without parameters"))?;

    let a = cast_in::<i8>(io.inputs[0])?;
    let b = cast_in::<i8>(io.inputs[1])?;
    let out = cast_out::<i8>(&mut *io.outputs[0])?;

    match kind {
        ArithKind::Add | ArithKind::Sub => {
            let params = ArithmeticParams::for_binary_op(qa, qb, qo, out_def.dtype, activation)?;
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                let s1 = params.scale_input1(x as i32);
                let s2 = params.scale_input2(y as i32);
                let raw = if kind == ArithKind::Add { s1 + s2 } else { s1 - s2 };
                params.rescale_output(raw) as i8
            })
        }
        ArithKind::Mul => {
            let real_multiplier = (qa.scale()? as f64 * qb.scale()? as f64) / qo.scale()? as f64;
            let (multiplier, shift) = quantize_multiplier(real_multiplier)?;
            let offset1 = -qa.zero_point()?;
            let offset2 = -qb.zero_point()?;
            let output_offset = qo.zero_point()?;
            let (min, max) = activation_range_quantized(
                activation,
                output_offset,
                qo.scale()?,
                out_def.dtype,
            )?;
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                let product = (x as i32 + offset1) * (y as i32 + offset2);
                let rescaled =
                    multiply_by_quantized_multiplier(product, multiplier, shift) + output_offset;
                rescaled.clamp(min, max) as i8
            })
        }
    }
}
