use anyhow::Result;
use microinfer::{
    ActivationKind, DType, Interpreter, ModelBuilder, OpCode, OpOptions, OperatorDef, Status,
    SubgraphDef,
};

use crate::common;

fn expect_invalid_model(graph: SubgraphDef) -> Result<()> {
    let raw = common::build_single(graph)?;
    match Interpreter::load(raw) {
        Err(Status::InvalidModel(_)) => Ok(()),
        Err(other) => panic!("expected InvalidModel, got {other:?}"),
        Ok(_) => panic!("expected InvalidModel, model loaded"),
    }
}

#[test]
fn comparison_rejects_mixed_input_dtypes() -> Result<()> {
    // F32 compared against I32 is a structural error, caught at load.
    expect_invalid_model(common::binary_graph(
        OpCode::NotEqual,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::I32, &[4]),
        common::tensor(DType::Bool, &[4]),
        OpOptions::None,
    ))
}

#[test]
fn comparison_output_must_be_bool() -> Result<()> {
    expect_invalid_model(common::binary_graph(
        OpCode::Greater,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        OpOptions::None,
    ))
}

#[test]
fn arithmetic_rejects_mixed_dtypes() -> Result<()> {
    expect_invalid_model(common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::I32, &[4]),
        common::tensor(DType::I32, &[4]),
        common::tensor(DType::I64, &[4]),
    ))
}

#[test]
fn quantized_integer_tensor_requires_parameters() -> Result<()> {
    // I8 without a quantization descriptor.
    expect_invalid_model(common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::I8, &[4]),
        common::quantized(DType::I8, &[4], 0.5, 0),
        common::quantized(DType::I8, &[4], 0.5, 0),
    ))
}

#[test]
fn float_tensor_rejects_quantization_descriptor() -> Result<()> {
    expect_invalid_model(common::arithmetic_graph(
        OpCode::Add,
        common::quantized(DType::F32, &[4], 0.5, 0),
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
    ))
}

#[test]
fn arity_is_checked_per_opcode() -> Result<()> {
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::F32, &[4]),
            common::tensor(DType::F32, &[4]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::Add,
            &[0],
            &[1],
            OpOptions::Arithmetic {
                activation: ActivationKind::None,
            },
        )],
        inputs: vec![0],
        outputs: vec![1],
    };
    expect_invalid_model(graph)
}

#[test]
fn options_must_match_opcode() -> Result<()> {
    expect_invalid_model(common::binary_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        OpOptions::None,
    ))
}

#[test]
fn omitted_required_input_is_rejected() -> Result<()> {
    let mut graph = common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
    );
    graph.operators[0].inputs[1] = None;
    graph.inputs = vec![0];
    expect_invalid_model(graph)
}

#[test]
fn in_place_operator_is_rejected() -> Result<()> {
    // Kernels get disjoint input and output slices; writing a tensor the
    // operator also reads is structurally invalid.
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::F32, &[4]),
            common::tensor(DType::F32, &[4]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::Add,
            &[0, 1],
            &[1],
            OpOptions::Arithmetic {
                activation: ActivationKind::None,
            },
        )],
        inputs: vec![0, 1],
        outputs: vec![1],
    };
    expect_invalid_model(graph)
}

#[test]
fn duplicate_operator_outputs_are_rejected() -> Result<()> {
    let mut builder = ModelBuilder::new();

    let main = SubgraphDef {
        tensors: vec![
            common::tensor(DType::I32, &[1]),
            common::tensor(DType::I32, &[1]),
            common::tensor(DType::I32, &[1]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::While,
            &[0, 1],
            // Arity matches the loop state, but both slots name tensor 2.
            &[2, 2],
            OpOptions::Loop {
                cond_subgraph: 1,
                body_subgraph: 2,
            },
        )],
        inputs: vec![0, 1],
        outputs: vec![2],
    };
    let cond = SubgraphDef {
        tensors: vec![
            common::tensor(DType::I32, &[1]),
            common::tensor(DType::I32, &[1]),
            common::tensor(DType::Bool, &[1]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::Greater,
            &[1, 0],
            &[2],
            OpOptions::None,
        )],
        inputs: vec![0, 1],
        outputs: vec![2],
    };
    let body = SubgraphDef {
        tensors: vec![
            common::tensor(DType::I32, &[1]),
            common::tensor(DType::I32, &[1]),
        ],
        operators: vec![],
        inputs: vec![0, 1],
        outputs: vec![1, 0],
    };
    builder.add_subgraph(main);
    builder.add_subgraph(cond);
    builder.add_subgraph(body);

    match Interpreter::load(builder.build()?) {
        Err(Status::InvalidModel(_)) => Ok(()),
        Err(other) => panic!("expected InvalidModel, got {other:?}"),
        Ok(_) => panic!("expected InvalidModel, model loaded"),
    }
}

#[test]
fn overflowing_tensor_shape_is_rejected() -> Result<()> {
    // Dimensions whose product cannot be represented must fail cleanly
    // instead of wrapping the byte length.
    let huge = u32::MAX as usize;
    expect_invalid_model(common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[huge, huge, huge]),
        common::tensor(DType::F32, &[huge, huge, huge]),
        common::tensor(DType::F32, &[huge, huge, huge]),
    ))
}

#[test]
fn branch_condition_must_be_bool_scalar() -> Result<()> {
    let mut builder = ModelBuilder::new();

    let main = SubgraphDef {
        tensors: vec![
            common::tensor(DType::I32, &[1]),
            common::tensor(DType::F32, &[2]),
            common::tensor(DType::F32, &[2]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::If,
            &[0, 1],
            &[2],
            OpOptions::Branch {
                then_subgraph: 1,
                else_subgraph: 2,
            },
        )],
        inputs: vec![0, 1],
        outputs: vec![2],
    };
    builder.add_subgraph(main);
    builder.add_subgraph(passthrough_branch());
    builder.add_subgraph(passthrough_branch());

    match Interpreter::load(builder.build()?) {
        Err(Status::InvalidModel(_)) => Ok(()),
        Err(other) => panic!("expected InvalidModel, got {other:?}"),
        Ok(_) => panic!("expected InvalidModel, model loaded"),
    }
}

#[test]
fn branch_arity_must_match_callee() -> Result<()> {
    let mut builder = ModelBuilder::new();

    let main = SubgraphDef {
        tensors: vec![
            common::tensor(DType::Bool, &[1]),
            common::tensor(DType::F32, &[2]),
            common::tensor(DType::F32, &[2]),
            common::tensor(DType::F32, &[2]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::If,
            // Two forwarded inputs against one-input branches.
            &[0, 1, 2],
            &[3],
            OpOptions::Branch {
                then_subgraph: 1,
                else_subgraph: 2,
            },
        )],
        inputs: vec![0, 1, 2],
        outputs: vec![3],
    };
    builder.add_subgraph(main);
    builder.add_subgraph(passthrough_branch());
    builder.add_subgraph(passthrough_branch());

    match Interpreter::load(builder.build()?) {
        Err(Status::InvalidModel(_)) => Ok(()),
        Err(other) => panic!("expected InvalidModel, got {other:?}"),
        Ok(_) => panic!("expected InvalidModel, model loaded"),
    }
}

fn passthrough_branch() -> SubgraphDef {
    SubgraphDef {
        tensors: vec![
            common::tensor(DType::F32, &[2]),
            common::tensor(DType::F32, &[2]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::Relu,
            &[0],
            &[1],
            OpOptions::None,
        )],
        inputs: vec![0],
        outputs: vec![1],
    }
}
