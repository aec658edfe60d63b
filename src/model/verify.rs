//! Load-time structural validation, one pass per operator.
//!
//! Anything checked here is a property of the serialized graph itself:
//! arity and option pairing per opcode, datatype agreement between operator
//! inputs, input/output disjointness, quantization invariants, buffer sizes,
//! and control-flow subgraph wiring. Violations abort the load with `InvalidModel` so configure and
//! execute never see a structurally broken graph.

use crate::dtype::DType;
use crate::model::{Model, OpCode, OpOptions, OperatorDef, SubgraphDef, TensorDef};
use crate::status::{Result, Status};

pub(crate) fn verify(model: &Model) -> Result<()> {
    for graph_index in 0..model.subgraph_count() {
        let subgraph = model.subgraph(graph_index)?;
        for (tensor_index, tensor) in subgraph.tensors.iter().enumerate() {
            verify_tensor(model, graph_index, tensor_index, tensor)?;
        }
        for (op_index, operator) in subgraph.operators.iter().enumerate() {
            verify_operator(model, subgraph, graph_index, op_index, operator)?;
        }
    }
    Ok(())
}

fn verify_tensor(
    model: &Model,
    graph: usize,
    index: usize,
    tensor: &TensorDef,
) -> Result<()> {
    // Element count and byte length must be representable; everything after
    // this point (including RuntimeGraph sizing) uses unchecked products.
    let byte_len = tensor
        .shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .and_then(|elems| elems.checked_mul(tensor.dtype.size()))
        .ok_or_else(|| {
            Status::invalid_model(format!(
                "tensor {graph}:{index} shape {:?} overflows its byte length",
                tensor.shape
            ))
        })?;

    match (&tensor.quant, tensor.dtype.is_quantizable()) {
        (Some(_), false) => {
            return Err(Status::invalid_model(format!(
                "tensor {graph}:{index} is {:?} but carries a quantization descriptor",
                tensor.dtype
            )));
        }
        (None, true) => {
            return Err(Status::invalid_model(format!(
                "quantized-integer tensor {graph}:{index} lacks a quantization descriptor"
            )));
        }
        _ => {}
    }

    if let Some(buffer) = tensor.buffer {
        let payload = model.buffer_bytes(buffer)?;
        if payload.len() != byte_len {
            return Err(Status::invalid_model(format!(
                "tensor {graph}:{index} expects {byte_len} constant bytes, buffer {buffer} holds {}",
                payload.len()
            )));
        }
        if model.buffer_offset(buffer)? % tensor.dtype.size() != 0 {
            return Err(Status::invalid_model(format!(
                "buffer {buffer} payload is misaligned for {:?}",
                tensor.dtype
            )));
        }
    }

    if let Some(offset) = tensor.plan_offset {
        let in_arena = offset
            .checked_add(byte_len)
            .is_some_and(|end| end <= model.arena_len());
        if !in_arena {
            return Err(Status::invalid_model(format!(
                "tensor {graph}:{index} plan range at {offset} ({byte_len} bytes) exceeds \
                 {}-byte arena",
                model.arena_len()
            )));
        }
        if offset % tensor.dtype.size() != 0 {
            return Err(Status::invalid_model(format!(
                "tensor {graph}:{index} plan offset {offset} is misaligned for {:?}",
                tensor.dtype
            )));
        }
    }
    Ok(())
}

struct OpRule {
    inputs: Option<usize>,
    outputs: Option<usize>,
    options: fn(&OpOptions) -> bool,
}

fn rule_for(opcode: OpCode) -> OpRule {
    use OpCode::*;
    let (inputs, outputs) = match opcode {
        Relu | Relu6 | Reshape | Cast | AveragePool2D => (Some(1), Some(1)),
        Add | Sub | Mul | Equal | NotEqual | Greater | ExpandDims | Fill | ArgMax | ArgMin => {
            (Some(2), Some(1))
        }
        StridedSlice => (Some(4), Some(1)),
        If | While => (None, None),
    };
    let options: fn(&OpOptions) -> bool = match opcode {
        Add | Sub | Mul => |o| matches!(o, OpOptions::Arithmetic { .. }),
        AveragePool2D => |o| matches!(o, OpOptions::Pool2D { .. }),
        StridedSlice => |o| matches!(o, OpOptions::StridedSlice { .. }),
        If => |o| matches!(o, OpOptions::Branch { .. }),
        While => |o| matches!(o, OpOptions::Loop { .. }),
        _ => |o| matches!(o, OpOptions::None),
    };
    OpRule {
        inputs,
        outputs,
        options,
    }
}

fn op_tensor<'a>(
    subgraph: &'a SubgraphDef,
    operator: &OperatorDef,
    input: usize,
) -> Result<&'a TensorDef> {
    let index = operator.inputs[input].ok_or_else(|| {
        Status::invalid_model(format!(
            "{:?} is missing required input {input}",
            operator.opcode
        ))
    })?;
    Ok(&subgraph.tensors[index])
}

fn verify_operator(
    model: &Model,
    subgraph: &SubgraphDef,
    graph: usize,
    op_index: usize,
    operator: &OperatorDef,
) -> Result<()> {
    let opcode = operator.opcode;
    let rule = rule_for(opcode);
    if let Some(expected) = rule.inputs {
        if operator.inputs.len() != expected {
            return Err(Status::invalid_model(format!(
                "{opcode:?} at {graph}:{op_index} expects {expected} inputs, has {}",
                operator.inputs.len()
            )));
        }
    }
    if let Some(expected) = rule.outputs {
        if operator.outputs.len() != expected {
            return Err(Status::invalid_model(format!(
                "{opcode:?} at {graph}:{op_index} expects {expected} outputs, has {}",
                operator.outputs.len()
            )));
        }
    }
    if !(rule.options)(&operator.options) {
        return Err(Status::invalid_model(format!(
            "{opcode:?} at {graph}:{op_index} carries mismatched options"
        )));
    }
    for (slot, input) in operator.inputs.iter().enumerate() {
        if input.is_none() {
            return Err(Status::invalid_model(format!(
                "{opcode:?} at {graph}:{op_index} is missing required input {slot}"
            )));
        }
    }

    // Kernels receive disjoint slices; in-place operators are not part of
    // the format.
    for (slot, output) in operator.outputs.iter().enumerate() {
        if operator.inputs.iter().flatten().any(|input| input == output) {
            return Err(Status::invalid_model(format!(
                "{opcode:?} at {graph}:{op_index} writes tensor {output} while reading it"
            )));
        }
        if operator.outputs[..slot].contains(output) {
            return Err(Status::invalid_model(format!(
                "{opcode:?} at {graph}:{op_index} lists output tensor {output} twice"
            )));
        }
    }

    use OpCode::*;
    match opcode {
        Add | Sub | Mul => {
            let a = op_tensor(subgraph, operator, 0)?;
            let b = op_tensor(subgraph, operator, 1)?;
            let out = &subgraph.tensors[operator.outputs[0]];
            if a.dtype != b.dtype || a.dtype != out.dtype {
                return Err(Status::invalid_model(format!(
                    "{opcode:?} at {graph}:{op_index} mixes datatypes {:?}/{:?}/{:?}",
                    a.dtype, b.dtype, out.dtype
                )));
            }
        }
        Equal | NotEqual | Greater => {
            let a = op_tensor(subgraph, operator, 0)?;
            let b = op_tensor(subgraph, operator, 1)?;
            let out = &subgraph.tensors[operator.outputs[0]];
            if a.dtype != b.dtype {
                return Err(Status::invalid_model(format!(
                    "{opcode:?} at {graph}:{op_index} compares {:?} against {:?}",
                    a.dtype, b.dtype
                )));
            }
            if out.dtype != DType::Bool {
                return Err(Status::invalid_model(format!(
                    "{opcode:?} at {graph}:{op_index} must produce Bool, declares {:?}",
                    out.dtype
                )));
            }
        }
        If => verify_if(model, subgraph, graph, op_index, operator)?,
        While => verify_while(model, subgraph, graph, op_index, operator)?,
        _ => {}
    }
    Ok(())
}

fn callee(model: &Model, graph: usize, op_index: usize, index: usize) -> Result<&SubgraphDef> {
    if index >= model.subgraph_count() {
        return Err(Status::invalid_model(format!(
            "control-flow operator at {graph}:{op_index} calls missing subgraph {index}"
        )));
    }
    model.subgraph(index)
}

fn verify_if(
    model: &Model,
    subgraph: &SubgraphDef,
    graph: usize,
    op_index: usize,
    operator: &OperatorDef,
) -> Result<()> {
    if operator.inputs.is_empty() {
        return Err(Status::invalid_model(format!(
            "If at {graph}:{op_index} needs a condition input"
        )));
    }
    let cond = op_tensor(subgraph, operator, 0)?;
    if cond.dtype != DType::Bool || cond.flat_size() != 1 {
        return Err(Status::invalid_model(format!(
            "If at {graph}:{op_index} condition must be a Bool scalar"
        )));
    }
    let (then_subgraph, else_subgraph) = match operator.options {
        OpOptions::Branch {
            then_subgraph,
            else_subgraph,
        } => (then_subgraph, else_subgraph),
        _ => unreachable!("option pairing checked above"),
    };
    let forwarded = operator.inputs.len() - 1;
    for branch in [then_subgraph, else_subgraph] {
        let callee = callee(model, graph, op_index, branch)?;
        if callee.inputs.len() != forwarded || callee.outputs.len() != operator.outputs.len() {
            return Err(Status::invalid_model(format!(
                "If at {graph}:{op_index} branch {branch} arity mismatch: \
                 branch is {}->{}, operator forwards {}->{}",
                callee.inputs.len(),
                callee.outputs.len(),
                forwarded,
                operator.outputs.len()
            )));
        }
    }
    Ok(())
}

fn verify_while(
    model: &Model,
    _subgraph: &SubgraphDef,
    graph: usize,
    op_index: usize,
    operator: &OperatorDef,
) -> Result<()> {
    let state = operator.inputs.len();
    if state == 0 || operator.outputs.len() != state {
        return Err(Status::invalid_model(format!(
            "While at {graph}:{op_index} must map n inputs to n outputs, got {}->{}",
            state,
            operator.outputs.len()
        )));
    }
    let (cond_subgraph, body_subgraph) = match operator.options {
        OpOptions::Loop {
            cond_subgraph,
            body_subgraph,
        } => (cond_subgraph, body_subgraph),
        _ => unreachable!("option pairing checked above"),
    };
    let cond = callee(model, graph, op_index, cond_subgraph)?;
    if cond.inputs.len() != state || cond.outputs.len() != 1 {
        return Err(Status::invalid_model(format!(
            "While at {graph}:{op_index} condition graph must be {state}->1"
        )));
    }
    let cond_out = &cond.tensors[cond.outputs[0]];
    if cond_out.dtype != DType::Bool || cond_out.flat_size() != 1 {
        return Err(Status::invalid_model(format!(
            "While at {graph}:{op_index} condition graph must produce a Bool scalar"
        )));
    }
    let body = callee(model, graph, op_index, body_subgraph)?;
    if body.inputs.len() != state || body.outputs.len() != state {
        return Err(Status::invalid_model(format!(
            "While at {graph}:{op_index} body graph must be {state}->{state}"
        )));
    }
    Ok(())
}
