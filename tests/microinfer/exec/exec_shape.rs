use anyhow::Result;
use microinfer::{
    DType, Interpreter, ModelBuilder, OpCode, OpOptions, OperatorDef, Status, SubgraphDef,
};

use crate::common;
use crate::common::constant_i32;

#[test]
fn reshape_preserves_bytes() -> Result<()> {
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::F32, &[2, 3]),
            common::tensor(DType::F32, &[3, 2]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::Reshape,
            &[0],
            &[1],
            OpOptions::None,
        )],
        inputs: vec![0],
        outputs: vec![1],
    };
    let mut interp = common::interpreter_for(graph)?;
    let data = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    interp.write_input(0, &data)?;
    interp.execute()?;
    assert_eq!(interp.output_as::<f32>(0)?, &data);
    Ok(())
}

#[test]
fn reshape_rejects_element_count_change() -> Result<()> {
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::F32, &[2, 3]),
            common::tensor(DType::F32, &[2, 2]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::Reshape,
            &[0],
            &[1],
            OpOptions::None,
        )],
        inputs: vec![0],
        outputs: vec![1],
    };
    let mut interp = common::interpreter_for(graph)?;
    assert!(matches!(
        interp.configure(),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn expand_dims_inserts_axis() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let axis = constant_i32(&mut builder, &[1], &[-1]);
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::I32, &[2, 2]),
            axis,
            common::tensor(DType::I32, &[2, 2, 1]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::ExpandDims,
            &[0, 1],
            &[2],
            OpOptions::None,
        )],
        inputs: vec![0],
        outputs: vec![2],
    };
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    interp.write_input(0, &[7i32, 8, 9, 10])?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i32>(0)?, &[7, 8, 9, 10]);
    Ok(())
}

#[test]
fn expand_dims_rejects_runtime_axis() -> Result<()> {
    // The axis arrives as a graph input instead of a constant.
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::I32, &[2]),
            common::tensor(DType::I32, &[1]),
            common::tensor(DType::I32, &[1, 2]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::ExpandDims,
            &[0, 1],
            &[2],
            OpOptions::None,
        )],
        inputs: vec![0, 1],
        outputs: vec![2],
    };
    let mut interp = common::interpreter_for(graph)?;
    assert!(matches!(
        interp.configure(),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn cast_f32_to_i32_truncates_toward_zero() -> Result<()> {
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::F32, &[4]),
            common::tensor(DType::I32, &[4]),
        ],
        operators: vec![OperatorDef::new(OpCode::Cast, &[0], &[1], OpOptions::None)],
        inputs: vec![0],
        outputs: vec![1],
    };
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[1.9f32, -1.9, 0.2, 100.0])?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i32>(0)?, &[1, -1, 0, 100]);
    Ok(())
}

#[test]
fn cast_i32_to_bool_and_back() -> Result<()> {
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::I32, &[4]),
            common::tensor(DType::Bool, &[4]),
        ],
        operators: vec![OperatorDef::new(OpCode::Cast, &[0], &[1], OpOptions::None)],
        inputs: vec![0],
        outputs: vec![1],
    };
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[0i32, 1, -7, 0])?;
    interp.execute()?;
    assert_eq!(interp.output_bytes(0)?, &[0u8, 1, 1, 0]);

    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::Bool, &[3]),
            common::tensor(DType::I64, &[3]),
        ],
        operators: vec![OperatorDef::new(OpCode::Cast, &[0], &[1], OpOptions::None)],
        inputs: vec![0],
        outputs: vec![1],
    };
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[1u8, 0, 1])?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i64>(0)?, &[1i64, 0, 1]);
    Ok(())
}

#[test]
fn cast_saturates_float_to_i8() -> Result<()> {
    let graph = SubgraphDef {
        tensors: vec![
            common::tensor(DType::F32, &[3]),
            common::quantized(DType::I8, &[3], 1.0, 0),
        ],
        operators: vec![OperatorDef::new(OpCode::Cast, &[0], &[1], OpOptions::None)],
        inputs: vec![0],
        outputs: vec![1],
    };
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[300.0f32, -300.0, 12.0])?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i8>(0)?, &[127i8, -128, 12]);
    Ok(())
}

#[test]
fn fill_splats_the_scalar_value() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let dims = constant_i32(&mut builder, &[2], &[2, 3]);
    let graph = SubgraphDef {
        tensors: vec![
            dims,
            common::tensor(DType::F32, &[1]),
            common::tensor(DType::F32, &[2, 3]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::Fill,
            &[0, 1],
            &[2],
            OpOptions::None,
        )],
        inputs: vec![1],
        outputs: vec![2],
    };
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    interp.write_input(0, &[2.5f32])?;
    interp.execute()?;
    assert_eq!(interp.output_as::<f32>(0)?, &[2.5f32; 6]);
    Ok(())
}

#[test]
fn fill_rejects_dims_disagreeing_with_output() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let dims = constant_i32(&mut builder, &[2], &[3, 3]);
    let graph = SubgraphDef {
        tensors: vec![
            dims,
            common::tensor(DType::F32, &[1]),
            common::tensor(DType::F32, &[2, 3]),
        ],
        operators: vec![OperatorDef::new(
            OpCode::Fill,
            &[0, 1],
            &[2],
            OpOptions::None,
        )],
        inputs: vec![1],
        outputs: vec![2],
    };
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    assert!(matches!(
        interp.configure(),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}
