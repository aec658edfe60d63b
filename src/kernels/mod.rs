//! Operator kernel registry and dispatch.
//!
//! Each opcode maps to a (configure, execute) pair. Configure runs once per
//! operator instance: it validates types and shapes, infers the output
//! shape, and binds output storage. Execute runs once per inference and is
//! the allocation-free hot path; within it, dispatch branches on the tensor
//! datatype. Control-flow opcodes are marked as such and routed through the
//! executor, which owns the subgraph recursion.

pub(crate) mod activation;
pub(crate) mod arg_min_max;
pub(crate) mod arithmetic;
pub(crate) mod cast;
pub(crate) mod common;
pub(crate) mod comparison;
pub(crate) mod control_flow;
pub(crate) mod fill;
pub(crate) mod pooling;
pub(crate) mod shape;
pub(crate) mod strided_slice;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::model::{OpCode, OpOptions, OperatorDef, SubgraphDef, TensorDef};
use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

pub type ConfigureFn = fn(&mut Interpreter, usize, usize) -> Result<()>;
pub type ExecuteFn = fn(&OpInfo<'_>, &mut KernelIo<'_>) -> Result<()>;

/// How an operator executes: a plain kernel function, or recursion into
/// another subgraph driven by the executor.
pub enum Exec {
    Kernel(ExecuteFn),
    If,
    While,
}

pub struct KernelDef {
    pub configure: ConfigureFn,
    pub execute: Exec,
}

/// Immutable view of one operator record and its subgraph, resolved once
/// per execute call.
pub struct OpInfo<'m> {
    pub subgraph: &'m SubgraphDef,
    pub operator: &'m OperatorDef,
}

impl<'m> OpInfo<'m> {
    pub fn input_def(&self, index: usize) -> Result<&'m TensorDef> {
        let tensor = self
            .operator
            .inputs
            .get(index)
            .copied()
            .flatten()
            .ok_or_else(|| Status::invalid_argument(format!("missing input {index}")))?;
        self.subgraph
            .tensors
            .get(tensor)
            .ok_or_else(|| Status::unknown(format!("input tensor {tensor} out of range")))
    }

    pub fn output_def(&self, index: usize) -> Result<&'m TensorDef> {
        let tensor = *self
            .operator
            .outputs
            .get(index)
            .ok_or_else(|| Status::invalid_argument(format!("missing output {index}")))?;
        self.subgraph
            .tensors
            .get(tensor)
            .ok_or_else(|| Status::unknown(format!("output tensor {tensor} out of range")))
    }

    pub fn options(&self) -> &'m OpOptions {
        &self.operator.options
    }
}

/// View a tensor's raw bytes as a typed element slice.
pub(crate) fn cast_in<T: bytemuck::Pod>(bytes: &[u8]) -> Result<&[T]> {
    bytemuck::try_cast_slice(bytes)
        .map_err(|_| Status::unknown("misaligned or odd-sized tensor view"))
}

pub(crate) fn cast_out<T: bytemuck::Pod>(bytes: &mut [u8]) -> Result<&mut [T]> {
    bytemuck::try_cast_slice_mut(bytes)
        .map_err(|_| Status::unknown("misaligned or odd-sized tensor view"))
}

static REGISTRY: Lazy<HashMap<OpCode, KernelDef>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(OpCode::Add, arithmetic::ADD);
    map.insert(OpCode::Sub, arithmetic::SUB);
    map.insert(OpCode::Mul, arithmetic::MUL);
    map.insert(OpCode::Equal, comparison::EQUAL);
    map.insert(OpCode::NotEqual, comparison::NOT_EQUAL);
    map.insert(OpCode::Greater, comparison::GREATER);
    map.insert(OpCode::Relu, activation::RELU);
    map.insert(OpCode::Relu6, activation::RELU6);
    map.insert(OpCode::Reshape, shape::RESHAPE);
    map.insert(OpCode::ExpandDims, shape::EXPAND_DIMS);
    map.insert(OpCode::Cast, cast::CAST);
    map.insert(OpCode::Fill, fill::FILL);
    map.insert(OpCode::StridedSlice, strided_slice::STRIDED_SLICE);
    map.insert(OpCode::ArgMax, arg_min_max::ARG_MAX);
    map.insert(OpCode::ArgMin, arg_min_max::ARG_MIN);
    map.insert(OpCode::AveragePool2D, pooling::AVERAGE_POOL_2D);
    map.insert(OpCode::If, control_flow::IF);
    map.insert(OpCode::While, control_flow::WHILE);
    map
});

pub(crate) fn kernel_for(opcode: OpCode) -> Result<&'static KernelDef> {
    REGISTRY
        .get(&opcode)
        .ok_or_else(|| Status::unsupported_type(format!("no kernel registered for {opcode:?}")))
}

/// Shared configure path for broadcastable binary operators: inputs must be
/// non-empty and broadcast-compatible, the declared output shape must match
/// the inferred one, then the output is bound.
pub(crate) fn configure_broadcast_binary(
    interp: &mut Interpreter,
    graph: usize,
    op: usize,
) -> Result<()> {
    let (out_index, a_shape, b_shape, declared) = {
        let info = interp.op_info(graph, op)?;
        (
            info.operator.outputs[0],
            info.input_def(0)?.shape.clone(),
            info.input_def(1)?.shape.clone(),
            info.output_def(0)?.shape.clone(),
        )
    };
    common::check_nonempty(&a_shape)?;
    common::check_nonempty(&b_shape)?;
    let inferred = common::broadcast_shape(&a_shape, &b_shape)?;
    common::expect_shape(&declared, &inferred)?;
    interp.bind_tensor(graph, out_index)
}

/// Shared configure path for elementwise unary operators: output shape must
/// equal the input shape; dtype equality is the caller's choice (Cast keeps
/// the shape but changes the datatype).
pub(crate) fn configure_same_shape(
    interp: &mut Interpreter,
    graph: usize,
    op: usize,
    require_same_dtype: bool,
) -> Result<()> {
    let (out_index, in_shape, in_dtype, declared, out_dtype) = {
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
    common::check_nonempty(&in_shape)?;
    common::expect_shape(&declared, &in_shape)?;
    if require_same_dtype && in_dtype != out_dtype {
        return Err(Status::invalid_argument(format!(
            "input is {in_dtype:?} but output declares {out_dtype:?}"
        )));
    }
    interp.bind_tensor(graph, out_index)
}
