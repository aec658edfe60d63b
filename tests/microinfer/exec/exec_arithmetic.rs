use anyhow::Result;
use microinfer::{ActivationKind, DType, OpCode, OpOptions, Status};

use crate::common;

fn run_f32(opcode: OpCode, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
    let graph = common::arithmetic_graph(
        opcode,
        common::tensor(DType::F32, &[a.len()]),
        common::tensor(DType::F32, &[b.len()]),
        common::tensor(DType::F32, &[a.len().max(b.len())]),
    );
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, a)?;
    interp.write_input(1, b)?;
    interp.execute()?;
    Ok(interp.output_as::<f32>(0)?.to_vec())
}

#[test]
fn add_sub_mul_f32() -> Result<()> {
    let a = [1.0f32, -2.0, 3.5, 0.0];
    let b = [0.5f32, 2.0, -1.0, 8.0];
    common::assert_f32_close(&run_f32(OpCode::Add, &a, &b)?, &[1.5, 0.0, 2.5, 8.0]);
    common::assert_f32_close(&run_f32(OpCode::Sub, &a, &b)?, &[0.5, -4.0, 4.5, -8.0]);
    common::assert_f32_close(&run_f32(OpCode::Mul, &a, &b)?, &[0.5, -4.0, -3.5, 0.0]);
    Ok(())
}

#[test]
fn add_is_commutative() -> Result<()> {
    let a = [3.25f32, -1.5, 7.0, 0.125];
    let b = [-2.0f32, 4.5, 1.25, 9.0];
    assert_eq!(run_f32(OpCode::Add, &a, &b)?, run_f32(OpCode::Add, &b, &a)?);
    Ok(())
}

#[test]
fn broadcast_scalar_matches_replicated_operand() -> Result<()> {
    let a = [1.0f32, 2.0, 3.0, 4.0];
    let broadcast = run_f32(OpCode::Mul, &a, &[2.5])?;
    let replicated = run_f32(OpCode::Mul, &a, &[2.5, 2.5, 2.5, 2.5])?;
    assert_eq!(broadcast, replicated);
    Ok(())
}

#[test]
fn broadcast_across_rows() -> Result<()> {
    // [2,3] + [3] broadcasts the row vector.
    let graph = common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[2, 3]),
        common::tensor(DType::F32, &[3]),
        common::tensor(DType::F32, &[2, 3]),
    );
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    interp.write_input(1, &[10.0f32, 20.0, 30.0])?;
    interp.execute()?;
    common::assert_f32_close(
        interp.output_as::<f32>(0)?,
        &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0],
    );
    Ok(())
}

#[test]
fn incompatible_broadcast_fails_configure() -> Result<()> {
    let graph = common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[3]),
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
    );
    let mut interp = common::interpreter_for(graph)?;
    assert!(matches!(
        interp.configure(),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn zero_extent_shape_fails_configure() -> Result<()> {
    let graph = common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[0]),
        common::tensor(DType::F32, &[0]),
        common::tensor(DType::F32, &[0]),
    );
    let mut interp = common::interpreter_for(graph)?;
    assert!(matches!(
        interp.configure(),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn fused_relu6_clamps_the_sum() -> Result<()> {
    let graph = common::binary_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        OpOptions::Arithmetic {
            activation: ActivationKind::Relu6,
        },
    );
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[-3.0f32, 1.0, 4.0, 10.0])?;
    interp.write_input(1, &[1.0f32, 1.0, 1.0, 1.0])?;
    interp.execute()?;
    common::assert_f32_close(interp.output_as::<f32>(0)?, &[0.0, 2.0, 5.0, 6.0]);
    Ok(())
}

#[test]
fn integer_arithmetic_i32_and_i64() -> Result<()> {
    let graph = common::arithmetic_graph(
        OpCode::Mul,
        common::tensor(DType::I32, &[3]),
        common::tensor(DType::I32, &[3]),
        common::tensor(DType::I32, &[3]),
    );
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[3i32, -4, 100_000])?;
    interp.write_input(1, &[7i32, 5, 3])?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i32>(0)?, &[21, -20, 300_000]);

    let graph = common::arithmetic_graph(
        OpCode::Sub,
        common::tensor(DType::I64, &[2]),
        common::tensor(DType::I64, &[2]),
        common::tensor(DType::I64, &[2]),
    );
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[10_000_000_000i64, -5])?;
    interp.write_input(1, &[1i64, 5])?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i64>(0)?, &[9_999_999_999i64, -10]);
    Ok(())
}

#[test]
fn second_execute_reuses_bindings() -> Result<()> {
    let graph = common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
    );
    let mut interp = common::interpreter_for(graph)?;
    interp.write_input(0, &[1.0f32; 4])?;
    interp.write_input(1, &[2.0f32; 4])?;
    interp.execute()?;
    common::assert_f32_close(interp.output_as::<f32>(0)?, &[3.0; 4]);

    interp.write_input(0, &[5.0f32; 4])?;
    interp.execute()?;
    common::assert_f32_close(interp.output_as::<f32>(0)?, &[7.0; 4]);
    Ok(())
}
