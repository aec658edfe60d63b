use anyhow::Result;
use microinfer::{
    DType, Interpreter, ModelBuilder, OpCode, OpOptions, OperatorDef, Status, SubgraphDef,
    TensorDef,
};

use crate::common;
use crate::common::constant_i32;

struct SliceSpec<'a> {
    begin: &'a [i32],
    end: &'a [i32],
    strides: &'a [i32],
    begin_mask: u32,
    end_mask: u32,
    shrink_axis_mask: u32,
}

fn slice_graph(
    builder: &mut ModelBuilder,
    input: TensorDef,
    output: TensorDef,
    spec: &SliceSpec<'_>,
) -> SubgraphDef {
    let rank = spec.begin.len();
    let begin = constant_i32(builder, &[rank], spec.begin);
    let end = constant_i32(builder, &[rank], spec.end);
    let strides = constant_i32(builder, &[rank], spec.strides);
    SubgraphDef {
        tensors: vec![input, begin, end, strides, output],
        operators: vec![OperatorDef::new(
            OpCode::StridedSlice,
            &[0, 1, 2, 3],
            &[4],
            OpOptions::StridedSlice {
                begin_mask: spec.begin_mask,
                end_mask: spec.end_mask,
                shrink_axis_mask: spec.shrink_axis_mask,
            },
        )],
        inputs: vec![0],
        outputs: vec![4],
    }
}

#[test]
fn slice_i8_middle_row_keeps_unit_axes() -> Result<()> {
    // No masks: the inferred shape keeps the sliced-to-one leading axes.
    let mut builder = ModelBuilder::new();
    let graph = slice_graph(
        &mut builder,
        common::quantized(DType::I8, &[3, 2, 3], 1.0, 0),
        common::quantized(DType::I8, &[1, 1, 3], 1.0, 0),
        &SliceSpec {
            begin: &[1, 0, 0],
            end: &[2, 1, 3],
            strides: &[1, 1, 1],
            begin_mask: 0,
            end_mask: 0,
            shrink_axis_mask: 0,
        },
    );
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    interp.write_input(
        0,
        &[
            15i8, 20, 17, 12, 5, 7, 6, 9, 4, 6, 7, 6, 15, 17, 24, 1, 8, 7,
        ],
    )?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i8>(0)?, &[6i8, 9, 4]);
    Ok(())
}

#[test]
fn slice_i8_row_with_shrink_axes() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let graph = slice_graph(
        &mut builder,
        common::quantized(DType::I8, &[3, 2, 3], 1.0, 0),
        common::quantized(DType::I8, &[3], 1.0, 0),
        &SliceSpec {
            begin: &[1, 0, 0],
            end: &[2, 1, 3],
            strides: &[1, 1, 1],
            begin_mask: 0,
            end_mask: 0,
            shrink_axis_mask: 0b011,
        },
    );
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    interp.write_input(
        0,
        &[
            15i8, 20, 17, 12, 5, 7, 6, 9, 4, 6, 7, 6, 15, 17, 24, 1, 8, 7,
        ],
    )?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i8>(0)?, &[6i8, 9, 4]);
    Ok(())
}

#[test]
fn slice_with_step_two() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let graph = slice_graph(
        &mut builder,
        common::tensor(DType::F32, &[6]),
        common::tensor(DType::F32, &[3]),
        &SliceSpec {
            begin: &[0],
            end: &[6],
            strides: &[2],
            begin_mask: 0,
            end_mask: 0,
            shrink_axis_mask: 0,
        },
    );
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    interp.write_input(0, &[0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0])?;
    interp.execute()?;
    common::assert_f32_close(interp.output_as::<f32>(0)?, &[0.0, 2.0, 4.0]);
    Ok(())
}

#[test]
fn negative_stride_reverses_with_masks() -> Result<()> {
    // begin and end masks select the full extent, walked backwards.
    let mut builder = ModelBuilder::new();
    let graph = slice_graph(
        &mut builder,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        &SliceSpec {
            begin: &[0],
            end: &[0],
            strides: &[-1],
            begin_mask: 1,
            end_mask: 1,
            shrink_axis_mask: 0,
        },
    );
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    interp.write_input(0, &[1.0f32, 2.0, 3.0, 4.0])?;
    interp.execute()?;
    common::assert_f32_close(interp.output_as::<f32>(0)?, &[4.0, 3.0, 2.0, 1.0]);
    Ok(())
}

#[test]
fn negative_begin_counts_from_the_end() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let graph = slice_graph(
        &mut builder,
        common::tensor(DType::I32, &[5]),
        common::tensor(DType::I32, &[2]),
        &SliceSpec {
            begin: &[-2],
            end: &[5],
            strides: &[1],
            begin_mask: 0,
            end_mask: 0,
            shrink_axis_mask: 0,
        },
    );
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    interp.write_input(0, &[10i32, 11, 12, 13, 14])?;
    interp.execute()?;
    assert_eq!(interp.output_as::<i32>(0)?, &[13, 14]);
    Ok(())
}

#[test]
fn zero_stride_fails_configure() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let graph = slice_graph(
        &mut builder,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        &SliceSpec {
            begin: &[0],
            end: &[4],
            strides: &[0],
            begin_mask: 0,
            end_mask: 0,
            shrink_axis_mask: 0,
        },
    );
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    assert!(matches!(
        interp.configure(),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn declared_shape_must_match_slice_plan() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let graph = slice_graph(
        &mut builder,
        common::tensor(DType::F32, &[6]),
        common::tensor(DType::F32, &[4]),
        &SliceSpec {
            begin: &[0],
            end: &[6],
            strides: &[2],
            begin_mask: 0,
            end_mask: 0,
            shrink_axis_mask: 0,
        },
    );
    builder.add_subgraph(graph);
    let mut interp = Interpreter::load(builder.build()?)?;
    assert!(matches!(
        interp.configure(),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}
