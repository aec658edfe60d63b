//! Standalone Relu and Relu6.
//!
//! The quantized paths require the input and output to share quantization
//! parameters, so the clamp happens directly in the quantized domain.

use crate::dtype::{ActivationKind, DType};
#[cfg(feature = "quant")]
use crate::quant::activation_range_quantized;
use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::{cast_in, cast_out, configure_same_shape, Exec, KernelDef, OpInfo};

pub const RELU: KernelDef = KernelDef {
    configure: configure_activation,
    execute: Exec::Kernel(|info, io| execute_activation(info, io, ActivationKind::Relu)),
};

pub const RELU6: KernelDef = KernelDef {
    configure: configure_activation,
    execute: Exec::Kernel(|info, io| execute_activation(info, io, ActivationKind::Relu6)),
};

fn configure_activation(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    {
        let info = interp.op_info(graph, op)?;
        let input = info.input_def(0)?;
        let output = info.output_def(0)?;
        if input.dtype == DType::I8 && input.quant != output.quant {
            return Err(Status::invalid_argument(
                "quantized activation requires matching input and output quantization",
            ));
        }
    }
    configure_same_shape(interp, graph, op, true)
}

fn execute_activation(
    info: &OpInfo<'_>,
    io: &mut KernelIo<'_>,
    kind: ActivationKind,
) -> Result<()> {
    let input = info.input_def(0)?;
    match input.dtype {
        #[cfg(feature = "float")]
        DType::F32 => {
            let a = cast_in::<f32>(io.inputs[0])?;
            let out = cast_out::<f32>(&mut *io.outputs[0])?;
            match kind {
                ActivationKind::Relu => {
                    for (o, &x) in out.iter_mut().zip(a) {
                        *o = x.max(0.0);
                    }
                }
                _ => {
                    for (o, &x) in out.iter_mut().zip(a) {
                        *o = x.clamp(0.0, 6.0);
                    }
                }
            }
            Ok(())
        }
        #[cfg(feature = "quant")]
        DType::I8 => {
            let quant = input
                .quant
                .as_ref()
                .ok_or_else(|| Status::invalid_argument("quantized input without parameters"))?;
            let (min, max) =
                activation_range_quantized(kind, quant.zero_point()?, quant.scale()?, DType::I8)?;
            let a = cast_in::<i8>(io.inputs[0])?;
            let out = cast_out::<i8>(&mut *io.outputs[0])?;
            for (o, &x) in out.iter_mut().zip(a) {
                *o = (x as i32).clamp(min, max) as i8;
            }
            Ok(())
        }
        other => Err(Status::unsupported_type(format!(
            "activation not supported for {other:?}"
        ))),
    }
}
