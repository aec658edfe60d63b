//! Fill: splat a scalar value over the output tensor.
//!
//! The dims input is a constant and the output shape is static, so configure
//! checks their agreement and execute degenerates to a byte-pattern splat
//! that works for every element datatype.

use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::common::check_nonempty;
use super::{Exec, KernelDef, OpInfo};

pub const FILL: KernelDef = KernelDef {
    configure: configure_fill,
    execute: Exec::Kernel(execute_fill),
};

fn configure_fill(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (out_index, dims_index, value_shape, value_dtype, out_shape, out_dtype) = {
        let info = interp.op_info(graph, op)?;
        let dims_index = info
            .operator
            .inputs
            .first()
            .copied()
            .flatten()
            .ok_or_else(|| Status::invalid_argument("fill requires a dims input"))?;
        let value = info.input_def(1)?;
        let output = info.output_def(0)?;
        (
            info.operator.outputs[0],
            dims_index,
            value.shape.clone(),
            value.dtype,
            output.shape.clone(),
            output.dtype,
        )
    };
    check_nonempty(&out_shape)?;
    if value_shape.iter().product::<usize>() != 1 {
        return Err(Status::invalid_argument("fill value must be a scalar"));
    }
    if value_dtype != out_dtype {
        return Err(Status::invalid_argument(format!(
            "fill value is {value_dtype:?} but output declares {out_dtype:?}"
        )));
    }

    let dims = interp.constant_i32s(graph, dims_index)?;
    if dims.len() != out_shape.len()
        || dims
            .iter()
            .zip(&out_shape)
            .any(|(&d, &s)| d < 0 || d as usize != s)
    {
        return Err(Status::invalid_argument(format!(
            "fill dims {dims:?} do not match declared output shape {out_shape:?}"
        )));
    }
    interp.bind_tensor(graph, out_index)
}

fn execute_fill(info: &OpInfo<'_>, io: &mut KernelIo<'_>) -> Result<()> {
    let elem = info.output_def(0)?.dtype.size();
    let value = io.inputs[1];
    if value.len() != elem {
        return Err(Status::unknown("fill value width does not match output dtype"));
    }
    let out = &mut *io.outputs[0];
    for chunk in out.chunks_exact_mut(elem) {
        chunk.copy_from_slice(value);
    }
    Ok(())
}
