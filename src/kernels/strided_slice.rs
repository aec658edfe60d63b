//! StridedSlice with begin/end/shrink-axis masks.
//!
//! The static index semantics: negative begin/end values count from the end
//! of the axis, mask bits replace the corresponding index with the full
//! extent, and a shrink bit collapses the axis to the single element at
//! begin. Strides may be negative; zero strides are rejected at configure.

use crate::model::OpOptions;
use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::common::{check_nonempty, contiguous_strides, expect_shape};
use super::{cast_in, Exec, KernelDef, OpInfo};

pub const STRIDED_SLICE: KernelDef = KernelDef {
    configure: configure_strided_slice,
    execute: Exec::Kernel(execute_strided_slice),
};

struct SliceMasks {
    begin: u32,
    end: u32,
    shrink: u32,
}

fn masks_of(options: &OpOptions) -> Result<SliceMasks> {
    match options {
        OpOptions::StridedSlice {
            begin_mask,
            end_mask,
            shrink_axis_mask,
        } => Ok(SliceMasks {
            begin: *begin_mask,
            end: *end_mask,
            shrink: *shrink_axis_mask,
        }),
        _ => Err(Status::unknown("strided slice operator without slice options")),
    }
}

/// Per-axis resolved walk: first element, element step, and element count.
struct AxisPlan {
    start: i64,
    stride: i64,
    count: usize,
    shrink: bool,
}

fn clamp_index(value: i64, dim: i64, stride: i64) -> i64 {
    let value = if value < 0 { value + dim } else { value };
    if stride > 0 {
        value.clamp(0, dim)
    } else {
        value.clamp(-1, dim - 1)
    }
}

fn resolve_axes(
    shape: &[usize],
    begin: &[i32],
    end: &[i32],
    strides: &[i32],
    masks: &SliceMasks,
) -> Result<Vec<AxisPlan>> {
    if begin.len() != shape.len() || end.len() != shape.len() || strides.len() != shape.len() {
        return Err(Status::invalid_argument(format!(
            "slice index tensors must have {} entries, got {}/{}/{}",
            shape.len(),
            begin.len(),
            end.len(),
            strides.len()
        )));
    }
    let mut plan = Vec::with_capacity(shape.len());
    for d in 0..shape.len() {
        let dim = shape[d] as i64;
        let stride = strides[d] as i64;
        if stride == 0 {
            return Err(Status::invalid_argument(format!(
                "slice stride on axis {d} must be non-zero"
            )));
        }
        let bit = 1u32 << d;
        let shrink = masks.shrink & bit != 0;

        if shrink {
            // A shrunk axis selects exactly the element at begin.
            let value = begin[d] as i64;
            let start = (if value < 0 { value + dim } else { value }).clamp(0, dim - 1);
            plan.push(AxisPlan {
                start,
                stride: 1,
                count: 1,
                shrink: true,
            });
            continue;
        }

        let start = if masks.begin & bit != 0 {
            if stride > 0 {
                0
            } else {
                dim - 1
            }
        } else {
            clamp_index(begin[d] as i64, dim, stride)
        };

        let (stop, stride) = if masks.end & bit != 0 {
            (if stride > 0 { dim } else { -1 }, stride)
        } else {
            (clamp_index(end[d] as i64, dim, stride), stride)
        };

        let count = if stride > 0 {
            ((stop - start).max(0) + stride - 1) / stride
        } else {
            ((stop - start).min(0) + stride + 1) / stride
        };
        plan.push(AxisPlan {
            start,
            stride,
            count: count as usize,
            shrink: false,
        });
    }
    Ok(plan)
}

fn inferred_shape(plan: &[AxisPlan]) -> Vec<usize> {
    plan.iter()
        .filter(|axis| !axis.shrink)
        .map(|axis| axis.count)
        .collect()
}

fn configure_strided_slice(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (out_index, index_ids, in_shape, in_dtype, declared, out_dtype, masks) = {
        let info = interp.op_info(graph, op)?;
        let input = info.input_def(0)?;
        let output = info.output_def(0)?;
        let mut ids = [0usize; 3];
        for (slot, id) in ids.iter_mut().enumerate() {
            *id = info
                .operator
                .inputs
                .get(slot + 1)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    Status::invalid_argument("strided slice requires begin/end/strides inputs")
                })?;
        }
        (
            info.operator.outputs[0],
            ids,
            input.shape.clone(),
            input.dtype,
            output.shape.clone(),
            output.dtype,
            masks_of(info.options())?,
        )
    };
    check_nonempty(&in_shape)?;
    if in_dtype != out_dtype {
        return Err(Status::invalid_argument(
            "strided slice cannot change the element datatype",
        ));
    }

    let begin = interp.constant_i32s(graph, index_ids[0])?;
    let end = interp.constant_i32s(graph, index_ids[1])?;
    let strides = interp.constant_i32s(graph, index_ids[2])?;
    let plan = resolve_axes(&in_shape, &begin, &end, &strides, &masks)?;
    if plan.iter().any(|axis| axis.count == 0) {
        return Err(Status::invalid_argument("slice selects zero elements"));
    }
    expect_shape(&declared, &inferred_shape(&plan))?;
    interp.bind_tensor(graph, out_index)
}

fn execute_strided_slice(info: &OpInfo<'_>, io: &mut KernelIo<'_>) -> Result<()> {
    let input = info.input_def(0)?;
    let masks = masks_of(info.options())?;
    let begin = cast_in::<i32>(io.inputs[1])?;
    let end = cast_in::<i32>(io.inputs[2])?;
    let strides = cast_in::<i32>(io.inputs[3])?;
    let plan = resolve_axes(&input.shape, begin, end, strides, &masks)?;

    let elem = input.dtype.size();
    let src = io.inputs[0];
    let dst = &mut *io.outputs[0];
    let in_strides = contiguous_strides(&input.shape);
    let total: usize = plan.iter().map(|axis| axis.count).product();
    if dst.len() != total * elem {
        return Err(Status::unknown("slice output length does not match plan"));
    }

    // Odometer over the per-axis counts, tracking the source element index.
    let mut index = vec![0usize; plan.len()];
    for flat in 0..total {
        let mut src_elem = 0i64;
        for d in 0..plan.len() {
            let pos = plan[d].start + index[d] as i64 * plan[d].stride;
            src_elem += pos * in_strides[d] as i64;
        }
        let src_off = src_elem as usize * elem;
        let dst_off = flat * elem;
        dst[dst_off..dst_off + elem].copy_from_slice(&src[src_off..src_off + elem]);

        for d in (0..plan.len()).rev() {
            index[d] += 1;
            if index[d] < plan[d].count {
                break;
            }
            index[d] = 0;
        }
    }
    Ok(())
}
