//! Reshape and ExpandDims. Both are layout no-ops over dense row-major
//! data, so execute is a plain byte copy.

use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::common::{check_nonempty, expect_shape, flat_size};
use super::{Exec, KernelDef, OpInfo};

pub const RESHAPE: KernelDef = KernelDef {
    configure: configure_reshape,
    execute: Exec::Kernel(execute_copy),
};

pub const EXPAND_DIMS: KernelDef = KernelDef {
    configure: configure_expand_dims,
    execute: Exec::Kernel(execute_copy),
};

fn configure_reshape(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (out_index, in_shape, in_dtype, out_shape, out_dtype) = {
        let info = interp.op_info(graph, op)?;
        let input = info.input_def(0)?;
        let output = info.output_def(0)?;
        (
            info.operator.outputs[0],
            input.shape.clone(),
            input.dtype,
            output.shape.clone(),
            output.dtype,
        )
    };
    check_nonempty(&in_shape)?;
    check_nonempty(&out_shape)?;
    if in_dtype != out_dtype {
        return Err(Status::invalid_argument(
            "reshape cannot change the element datatype",
        ));
    }
    if flat_size(&in_shape) != flat_size(&out_shape) {
        return Err(Status::invalid_argument(format!(
            "reshape from {in_shape:?} to {out_shape:?} changes the element count"
        )));
    }
    interp.bind_tensor(graph, out_index)
}

fn configure_expand_dims(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (out_index, axis_index, in_shape, in_dtype, declared, out_dtype) = {
        let info = interp.op_info(graph, op)?;
        let input = info.input_def(0)?;
        let output = info.output_def(0)?;
        let axis_index = info
            .operator
            .inputs
            .get(1)
            .copied()
            .flatten()
            .ok_or_else(|| Status::invalid_argument("expand_dims requires an axis input"))?;
        (
            info.operator.outputs[0],
            axis_index,
            input.shape.clone(),
            input.dtype,
            output.shape.clone(),
            output.dtype,
        )
    };
    check_nonempty(&in_shape)?;
    if in_dtype != out_dtype {
        return Err(Status::invalid_argument(
            "expand_dims cannot change the element datatype",
        ));
    }

    let axes = interp.constant_i32s(graph, axis_index)?;
    if axes.len() != 1 {
        return Err(Status::invalid_argument("expand_dims axis must be a scalar"));
    }
    let rank = in_shape.len() as i32;
    let mut axis = axes[0];
    if axis < 0 {
        axis += rank + 1;
    }
    if !(0..=rank).contains(&axis) {
        return Err(Status::invalid_argument(format!(
            "expand_dims axis {} out of range for rank {rank}",
            axes[0]
        )));
    }

    let mut inferred = in_shape;
    inferred.insert(axis as usize, 1);
    expect_shape(&declared, &inferred)?;
    interp.bind_tensor(graph, out_index)
}

fn execute_copy(_info: &OpInfo<'_>, io: &mut KernelIo<'_>) -> Result<()> {
    let src = io.inputs[0];
    let dst = &mut *io.outputs[0];
    if src.len() != dst.len() {
        return Err(Status::unknown("copy operands differ in byte length"));
    }
    dst.copy_from_slice(src);
    Ok(())
}
