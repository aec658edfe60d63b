#[path = "common/mod.rs"]
mod common;

#[path = "model/model_load.rs"]
mod model_load;
#[path = "model/model_verify.rs"]
mod model_verify;

#[path = "exec/exec_arithmetic.rs"]
mod exec_arithmetic;
#[path = "exec/exec_comparison.rs"]
mod exec_comparison;
#[path = "exec/exec_quantized.rs"]
mod exec_quantized;
#[path = "exec/exec_shape.rs"]
mod exec_shape;
#[path = "exec/exec_slice.rs"]
mod exec_slice;
#[path = "exec/exec_reduce.rs"]
mod exec_reduce;
#[path = "exec/exec_pooling.rs"]
mod exec_pooling;
#[path = "exec/exec_control_flow.rs"]
mod exec_control_flow;
#[path = "exec/exec_memory.rs"]
mod exec_memory;

#[path = "quant/quant_math.rs"]
mod quant_math;
