//! AveragePool2D over NHWC tensors.
//!
//! Border windows average only the taps that land inside the input, so the
//! divisor shrinks at the edges under Same padding. The quantized path runs
//! entirely in the quantized domain and therefore requires the input and
//! output to share quantization parameters.

use crate::dtype::{ActivationKind, DType};
use crate::model::{OpOptions, Padding};
#[cfg(feature = "float")]
use crate::quant::activation_range;
#[cfg(feature = "quant")]
use crate::quant::activation_range_quantized;
use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::common::{check_nonempty, expect_shape};
use super::{cast_in, cast_out, Exec, KernelDef, OpInfo};

pub const AVERAGE_POOL_2D: KernelDef = KernelDef {
    configure: configure_average_pool,
    execute: Exec::Kernel(execute_average_pool),
};

#[derive(Clone, Copy)]
struct PoolParams {
    padding: Padding,
    activation: ActivationKind,
    stride_w: usize,
    stride_h: usize,
    filter_w: usize,
    filter_h: usize,
}

fn params_of(options: &OpOptions) -> Result<PoolParams> {
    match options {
        OpOptions::Pool2D {
            padding,
            activation,
            stride_w,
            stride_h,
            filter_w,
            filter_h,
        } => Ok(PoolParams {
            padding: *padding,
            activation: *activation,
            stride_w: *stride_w,
            stride_h: *stride_h,
            filter_w: *filter_w,
            filter_h: *filter_h,
        }),
        _ => Err(Status::unknown("pooling operator without pooling options")),
    }
}

fn output_extent(padding: Padding, input: usize, filter: usize, stride: usize) -> Result<usize> {
    match padding {
        Padding::Same => Ok((input + stride - 1) / stride),
        Padding::Valid => {
            if input < filter {
                return Err(Status::invalid_argument(format!(
                    "valid padding needs input extent {input} >= filter {filter}"
                )));
            }
            Ok((input - filter) / stride + 1)
        }
    }
}

fn pad_before(padding: Padding, input: usize, output: usize, filter: usize, stride: usize) -> i64 {
    match padding {
        Padding::Same => {
            let needed = (output - 1) * stride + filter;
            (needed.saturating_sub(input) / 2) as i64
        }
        Padding::Valid => 0,
    }
}

fn configure_average_pool(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (out_index, in_shape, in_dtype, in_quant, declared, out_dtype, out_quant, params) = {
        let info = interp.op_info(graph, op)?;
        let input = info.input_def(0)?;
        let output = info.output_def(0)?;
        (
            info.operator.outputs[0],
            input.shape.clone(),
            input.dtype,
            input.quant.clone(),
            output.shape.clone(),
            output.dtype,
            output.quant.clone(),
            params_of(info.options())?,
        )
    };
    check_nonempty(&in_shape)?;
    if in_shape.len() != 4 {
        return Err(Status::invalid_argument(
            "average pool expects an NHWC input of rank 4",
        ));
    }
    if in_dtype != out_dtype {
        return Err(Status::invalid_argument(
            "average pool cannot change the element datatype",
        ));
    }
    if params.stride_w == 0 || params.stride_h == 0 || params.filter_w == 0 || params.filter_h == 0
    {
        return Err(Status::invalid_argument(
            "pool strides and filter extents must be at least 1",
        ));
    }
    if in_dtype == DType::I8 && in_quant != out_quant {
        return Err(Status::invalid_argument(
            "quantized average pool requires matching input and output quantization",
        ));
    }

    let out_h = output_extent(params.padding, in_shape[1], params.filter_h, params.stride_h)?;
    let out_w = output_extent(params.padding, in_shape[2], params.filter_w, params.stride_w)?;
    let inferred = vec![in_shape[0], out_h, out_w, in_shape[3]];
    expect_shape(&declared, &inferred)?;
    interp.bind_tensor(graph, out_index)
}

fn execute_average_pool(info: &OpInfo<'_>, io: &mut KernelIo<'_>) -> Result<()> {
    let input = info.input_def(0)?;
    let output = info.output_def(0)?;
    let params = params_of(info.options())?;

    let (batches, in_h, in_w, channels) = (
        input.shape[0],
        input.shape[1],
        input.shape[2],
        input.shape[3],
    );
    let (out_h, out_w) = (output.shape[1], output.shape[2]);
    let pad_h = pad_before(params.padding, in_h, out_h, params.filter_h, params.stride_h);
    let pad_w = pad_before(params.padding, in_w, out_w, params.filter_w, params.stride_w);

    match input.dtype {
        #[cfg(feature = "float")]
        DType::F32 => {
            let (min, max) = activation_range(params.activation);
            let src = cast_in::<f32>(io.inputs[0])?;
            let dst = cast_out::<f32>(&mut *io.outputs[0])?;
            for b in 0..batches {
                for oy in 0..out_h {
                    for ox in 0..out_w {
                        for c in 0..channels {
                            let mut sum = 0f32;
                            let mut taps = 0usize;
                            for fy in 0..params.filter_h {
                                for fx in 0..params.filter_w {
                                    let iy = oy as i64 * params.stride_h as i64 - pad_h + fy as i64;
                                    let ix = ox as i64 * params.stride_w as i64 - pad_w + fx as i64;
                                    if iy < 0 || iy >= in_h as i64 || ix < 0 || ix >= in_w as i64 {
                                        continue;
                                    }
                                    let idx = ((b * in_h + iy as usize) * in_w + ix as usize)
                                        * channels
                                        + c;
                                    sum += src[idx];
                                    taps += 1;
                                }
                            }
                            let idx = ((b * out_h + oy) * out_w + ox) * channels + c;
                            let avg = if taps > 0 { sum / taps as f32 } else { 0.0 };
                            dst[idx] = avg.clamp(min, max);
                        }
                    }
                }
            }
            Ok(())
        }
        #[cfg(feature = "quant")]
        DType::I8 => {
            let quant = output
                .quant
                .as_ref()
                .ok_or_else(|| Status::invalid_argument("quantized output without parameters"))?;
            let (min, max) = activation_range_quantized(
                params.activation,
                quant.zero_point()?,
                quant.scale()?,
                DType::I8,
            )?;
            let src = cast_in::<i8>(io.inputs[0])?;
            let dst = cast_out::<i8>(&mut *io.outputs[0])?;
            for b in 0..batches {
                for oy in 0..out_h {
                    for ox in 0..out_w {
                        for c in 0..channels {
                            let mut sum = 0i32;
                            let mut taps = 0i32;
                            for fy in 0..params.filter_h {
                                for fx in 0..params.filter_w {
                                    let iy = oy as i64 * params.stride_h as i64 - pad_h + fy as i64;
                                    let ix = ox as i64 * params.stride_w as i64 - pad_w + fx as i64;
                                    if iy < 0 || iy >= in_h as i64 || ix < 0 || ix >= in_w as i64 {
                                        continue;
                                    }
                                    let idx = ((b * in_h + iy as usize) * in_w + ix as usize)
                                        * channels
                                        + c;
                                    sum += src[idx] as i32;
                                    taps += 1;
                                }
                            }
                            // Round half away from zero, as truncating
                            // division does after the half-step offset.
                            let avg = if taps > 0 {
                                if sum > 0 {
                                    (sum + taps / 2) / taps
                                } else {
                                    (sum - taps / 2) / taps
                                }
                            } else {
                                0
                            };
                            let idx = ((b * out_h + oy) * out_w + ox) * channels + c;
                            dst[idx] = avg.clamp(min, max) as i8;
                        }
                    }
                }
            }
            Ok(())
        }
        other => Err(Status::unsupported_type(format!(
            "average pool not supported for {other:?}"
        ))),
    }
}
