//! ArgMax and ArgMin along one axis, writing I32 indices. Ties resolve to
//! the lowest index.

use crate::dtype::DType;
use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::common::{check_nonempty, expect_shape};
use super::{cast_in, cast_out, Exec, KernelDef, OpInfo};

pub const ARG_MAX: KernelDef = KernelDef {
    configure: configure_arg,
    execute: Exec::Kernel(|info, io| execute_arg(info, io, true)),
};

pub const ARG_MIN: KernelDef = KernelDef {
    configure: configure_arg,
    execute: Exec::Kernel(|info, io| execute_arg(info, io, false)),
};

fn resolve_axis(axis: i32, rank: usize) -> Result<usize> {
    let rank = rank as i32;
    let resolved = if axis < 0 { axis + rank } else { axis };
    if !(0..rank).contains(&resolved) {
        return Err(Status::invalid_argument(format!(
            "reduction axis {axis} out of range for rank {rank}"
        )));
    }
    Ok(resolved as usize)
}

fn configure_arg(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (out_index, axis_index, in_shape, declared, out_dtype) = {
        let info = interp.op_info(graph, op)?;
        let input = info.input_def(0)?;
        let output = info.output_def(0)?;
        let axis_index = info
            .operator
            .inputs
            .get(1)
            .copied()
            .flatten()
            .ok_or_else(|| Status::invalid_argument("arg reduction requires an axis input"))?;
        (
            info.operator.outputs[0],
            axis_index,
            input.shape.clone(),
            output.shape.clone(),
            output.dtype,
        )
    };
    check_nonempty(&in_shape)?;
    if out_dtype != DType::I32 {
        return Err(Status::invalid_argument(
            "arg reduction output must be I32",
        ));
    }

    let axes = interp.constant_i32s(graph, axis_index)?;
    if axes.len() != 1 {
        return Err(Status::invalid_argument("reduction axis must be a scalar"));
    }
    let axis = resolve_axis(axes[0], in_shape.len())?;

    let mut inferred = in_shape;
    inferred.remove(axis);
    expect_shape(&declared, &inferred)?;
    interp.bind_tensor(graph, out_index)
}

fn arg_scan<T: Copy + PartialOrd>(
    values: &[T],
    shape: &[usize],
    axis: usize,
    out: &mut [i32],
    take_max: bool,
) {
    let axis_len = shape[axis];
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis + 1..].iter().product();
    for o in 0..outer {
        for i in 0..inner {
            let mut best = 0usize;
            let mut best_value = values[(o * axis_len) * inner + i];
            for k in 1..axis_len {
                let v = values[(o * axis_len + k) * inner + i];
                let better = if take_max {
                    v > best_value
                } else {
                    v < best_value
                };
                if better {
                    best = k;
                    best_value = v;
                }
            }
            out[o * inner + i] = best as i32;
        }
    }
}

fn execute_arg(info: &OpInfo<'_>, io: &mut KernelIo<'_>, take_max: bool) -> Result<()> {
    let input = info.input_def(0)?;
    let axes = cast_in::<i32>(io.inputs[1])?;
    let raw_axis = axes
        .first()
        .copied()
        .ok_or_else(|| Status::invalid_argument("reduction axis tensor is empty"))?;
    let axis = resolve_axis(raw_axis, input.shape.len())?;
    let out = cast_out::<i32>(&mut *io.outputs[0])?;

    match input.dtype {
        #[cfg(feature = "float")]
        DType::F32 => {
            let values = cast_in::<f32>(io.inputs[0])?;
            arg_scan(values, &input.shape, axis, out, take_max);
            Ok(())
        }
        DType::I8 => {
            let values = cast_in::<i8>(io.inputs[0])?;
            arg_scan(values, &input.shape, axis, out, take_max);
            Ok(())
        }
        DType::I32 => {
            let values = cast_in::<i32>(io.inputs[0])?;
            arg_scan(values, &input.shape, axis, out, take_max);
            Ok(())
        }
        other => Err(Status::unsupported_type(format!(
            "arg reduction not supported for {other:?}"
        ))),
    }
}
