mod dtype;
mod kernels;
mod memory;
mod model;
mod quant;
mod runtime;
mod status;

pub mod logging;

pub use dtype::{ActivationKind, DType, QuantParams};
pub use memory::{AlignedBuf, MemoryConfig, MemoryManager};
pub use model::{
    Model, ModelBuilder, ModelInfo, OpCode, OpOptions, OperatorDef, Padding, SubgraphDef,
    SubgraphInfo, TensorDef,
};
pub use quant::{
    multiply_by_quantized_multiplier, quantize_multiplier, quantize_multiplier_smaller_than_one,
    rounding_divide_by_pot, saturating_rounding_doubling_high_mul,
};
pub use runtime::Interpreter;
pub use status::{Result, Status};
