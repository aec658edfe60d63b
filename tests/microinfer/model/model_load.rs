use anyhow::Result;
use microinfer::{
    DType, Interpreter, Model, ModelBuilder, OpCode, Status, SubgraphDef, TensorDef,
};

use crate::common;

fn add_graph() -> SubgraphDef {
    common::arithmetic_graph(
        OpCode::Add,
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
        common::tensor(DType::F32, &[4]),
    )
}

#[test]
fn load_reports_model_info() -> Result<()> {
    let mut builder = ModelBuilder::new();
    builder.set_arena_len(64);
    builder.add_subgraph(add_graph());
    let model = Model::load(builder.build()?)?;

    let info = model.info();
    assert_eq!(info.arena_len, 64);
    assert_eq!(info.subgraphs.len(), 1);
    assert_eq!(info.subgraphs[0].tensors, 3);
    assert_eq!(info.subgraphs[0].operators, 1);

    // The summary is serializable for tooling.
    let rendered = serde_json::to_string(&info)?;
    assert!(rendered.contains("\"arena_len\":64"));
    Ok(())
}

#[test]
fn interpreter_reports_graph_io_sizes() -> Result<()> {
    let interp = common::interpreter_for(add_graph())?;
    assert_eq!(interp.input_count(), 2);
    assert_eq!(interp.output_count(), 1);
    assert_eq!(interp.input_byte_len(0)?, 16);
    assert_eq!(interp.input_byte_len(1)?, 16);
    assert_eq!(interp.output_byte_len(0)?, 16);
    assert!(matches!(
        interp.input_byte_len(2),
        Err(Status::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn load_rejects_bad_magic() -> Result<()> {
    let mut raw = common::build_single(add_graph())?;
    raw[0] = b'X';
    assert!(matches!(
        Interpreter::load(raw),
        Err(Status::InvalidModel(_))
    ));
    Ok(())
}

#[test]
fn load_rejects_unknown_version() -> Result<()> {
    let mut raw = common::build_single(add_graph())?;
    raw[4..8].copy_from_slice(&99u32.to_le_bytes());
    assert!(matches!(
        Interpreter::load(raw),
        Err(Status::InvalidModel(_))
    ));
    Ok(())
}

#[test]
fn load_rejects_truncated_bytes() -> Result<()> {
    let raw = common::build_single(add_graph())?;
    for len in [0, 3, 8, raw.len() / 2] {
        let truncated = raw[..len].to_vec();
        assert!(
            matches!(Interpreter::load(truncated), Err(Status::InvalidModel(_))),
            "length {len} should not load"
        );
    }
    Ok(())
}

#[test]
fn load_rejects_out_of_range_operator_tensor() -> Result<()> {
    let mut graph = add_graph();
    graph.operators[0].inputs[1] = Some(7);
    assert!(matches!(
        Interpreter::load(common::build_single(graph)?),
        Err(Status::InvalidModel(_))
    ));
    Ok(())
}

#[test]
fn load_rejects_constant_buffer_size_mismatch() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let short = builder.add_buffer(&1.0f32.to_le_bytes());
    let mut graph = add_graph();
    // Tensor holds four f32 but the buffer carries one.
    graph.tensors[1].buffer = Some(short);
    graph.inputs = vec![0];
    builder.add_subgraph(graph);
    assert!(matches!(
        Interpreter::load(builder.build()?),
        Err(Status::InvalidModel(_))
    ));
    Ok(())
}

#[test]
fn load_rejects_plan_range_outside_arena() -> Result<()> {
    let mut builder = ModelBuilder::new();
    builder.set_arena_len(16);
    let mut graph = add_graph();
    graph.tensors[2].plan_offset = Some(8);
    builder.add_subgraph(graph);
    assert!(matches!(
        Interpreter::load(builder.build()?),
        Err(Status::InvalidModel(_))
    ));
    Ok(())
}

#[test]
fn constant_tensor_payload_is_readable() -> Result<()> {
    let mut builder = ModelBuilder::new();
    let values = [1i32, 2, 3, 4];
    let mut bytes = Vec::new();
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    let buffer = builder.add_buffer(&bytes);

    let mut def = TensorDef::new(DType::I32, &[4]);
    def.buffer = Some(buffer);
    let graph = SubgraphDef {
        tensors: vec![def],
        operators: vec![],
        inputs: vec![],
        outputs: vec![0],
    };
    builder.add_subgraph(graph);

    let model = Model::load(builder.build()?)?;
    assert_eq!(model.buffer_bytes(buffer)?, bytes.as_slice());
    Ok(())
}
