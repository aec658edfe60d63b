//! Binary model view: a validated, decoded description of the serialized
//! graph plus zero-copy access to its constant buffers.
//!
//! `Model::load` parses the MIF wire format once, bounds-checking every
//! table reference and index, and keeps tensor payloads where they are:
//! constant data stays as `(offset, len)` ranges into the load-time byte
//! buffer. All accessors are pure reads.

mod builder;
mod reader;
mod verify;

pub use builder::ModelBuilder;

use serde::Serialize;

use crate::dtype::{ActivationKind, DType, QuantParams};
use crate::memory::AlignedBuf;
use crate::status::{Result, Status};

use reader::ByteReader;

pub const MAGIC: [u8; 4] = *b"MIF1";
pub const SCHEMA_VERSION: u32 = 1;

/// Operator codes in the wire schema. A closed set: dispatch resolves each
/// code into a (configure, execute) pair once at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OpCode {
    Add,
    Sub,
    Mul,
    Equal,
    NotEqual,
    Greater,
    Relu,
    Relu6,
    Reshape,
    ExpandDims,
    Cast,
    Fill,
    StridedSlice,
    ArgMax,
    ArgMin,
    AveragePool2D,
    If,
    While,
}

impl OpCode {
    pub fn from_tag(tag: u16) -> Option<OpCode> {
        use OpCode::*;
        Some(match tag {
            0 => Add,
            1 => Sub,
            2 => Mul,
            3 => Equal,
            4 => NotEqual,
            5 => Greater,
            6 => Relu,
            7 => Relu6,
            8 => Reshape,
            9 => ExpandDims,
            10 => Cast,
            11 => Fill,
            12 => StridedSlice,
            13 => ArgMax,
            14 => ArgMin,
            15 => AveragePool2D,
            16 => If,
            17 => While,
            _ => return None,
        })
    }

    pub fn tag(self) -> u16 {
        use OpCode::*;
        match self {
            Add => 0,
            Sub => 1,
            Mul => 2,
            Equal => 3,
            NotEqual => 4,
            Greater => 5,
            Relu => 6,
            Relu6 => 7,
            Reshape => 8,
            ExpandDims => 9,
            Cast => 10,
            Fill => 11,
            StridedSlice => 12,
            ArgMax => 13,
            ArgMin => 14,
            AveragePool2D => 15,
            If => 16,
            While => 17,
        }
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Padding {
    Same,
    Valid,
}

impl Padding {
    pub fn from_tag(tag: u8) -> Option<Padding> {
        match tag {
            0 => Some(Padding::Same),
            1 => Some(Padding::Valid),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Padding::Same => 0,
            Padding::Valid => 1,
        }
    }
}

/// Operator options payload; the valid shape depends on the opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOptions {
    None,
    Arithmetic {
        activation: ActivationKind,
    },
    Pool2D {
        padding: Padding,
        activation: ActivationKind,
        stride_w: usize,
        stride_h: usize,
        filter_w: usize,
        filter_h: usize,
    },
    StridedSlice {
        begin_mask: u32,
        end_mask: u32,
        shrink_axis_mask: u32,
    },
    Branch {
        then_subgraph: usize,
        else_subgraph: usize,
    },
    Loop {
        cond_subgraph: usize,
        body_subgraph: usize,
    },
}

/// One tensor record: immutable shape and dtype, optional quantization
/// descriptor, and at most one backing hint (constant buffer index or a
/// static plan offset into the shared arena).
#[derive(Debug, Clone)]
pub struct TensorDef {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub quant: Option<QuantParams>,
    pub buffer: Option<usize>,
    pub plan_offset: Option<usize>,
}

impl TensorDef {
    pub fn new(dtype: DType, shape: &[usize]) -> Self {
        Self {
            dtype,
            shape: shape.to_vec(),
            quant: None,
            buffer: None,
            plan_offset: None,
        }
    }

    pub fn flat_size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn byte_len(&self) -> usize {
        self.flat_size() * self.dtype.size()
    }

    pub fn is_constant(&self) -> bool {
        self.buffer.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct OperatorDef {
    pub opcode: OpCode,
    /// `None` marks an omitted optional input.
    pub inputs: Vec<Option<usize>>,
    pub outputs: Vec<usize>,
    pub options: OpOptions,
}

impl OperatorDef {
    pub fn new(opcode: OpCode, inputs: &[usize], outputs: &[usize], options: OpOptions) -> Self {
        Self {
            opcode,
            inputs: inputs.iter().map(|&i| Some(i)).collect(),
            outputs: outputs.to_vec(),
            options,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubgraphDef {
    pub tensors: Vec<TensorDef>,
    pub operators: Vec<OperatorDef>,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

/// Serializable load summary for tooling and logs.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub version: u32,
    pub arena_len: usize,
    pub buffer_count: usize,
    pub subgraphs: Vec<SubgraphInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphInfo {
    pub tensors: usize,
    pub operators: usize,
    pub inputs: usize,
    pub outputs: usize,
}

/// Decoded model. Owns the serialized bytes for its whole lifetime;
/// constant buffers are ranges into them, never copies.
#[derive(Debug)]
pub struct Model {
    bytes: AlignedBuf,
    arena_len: usize,
    buffers: Vec<(usize, usize)>,
    subgraphs: Vec<SubgraphDef>,
}

impl Model {
    /// Parse and validate a self-contained serialized graph. Any malformed
    /// header, truncated table, or out-of-range index fails with
    /// `InvalidModel`; nothing is partially loaded.
    pub fn load(raw: Vec<u8>) -> Result<Model> {
        // Copied once into word-aligned storage so constant payloads (padded
        // to 8 bytes by the writer) can be viewed as typed slices.
        let bytes = AlignedBuf::from_bytes(&raw);
        drop(raw);
        let (arena_len, buffers, subgraphs) = parse_model(bytes.bytes())?;
        let model = Model {
            bytes,
            arena_len,
            buffers,
            subgraphs,
        };
        verify::verify(&model)?;
        crate::trace!(
            "model loaded: {} subgraph(s), {} buffer(s), {} arena bytes",
            model.subgraphs.len(),
            model.buffers.len(),
            model.arena_len
        );
        Ok(model)
    }

    pub fn arena_len(&self) -> usize {
        self.arena_len
    }

    pub fn subgraph_count(&self) -> usize {
        self.subgraphs.len()
    }

    pub fn subgraph(&self, index: usize) -> Result<&SubgraphDef> {
        self.subgraphs.get(index).ok_or_else(|| {
            Status::invalid_model(format!("subgraph index {index} out of range"))
        })
    }

    pub fn tensor(&self, graph: usize, tensor: usize) -> Result<&TensorDef> {
        self.subgraph(graph)?.tensors.get(tensor).ok_or_else(|| {
            Status::invalid_model(format!("tensor index {tensor} out of range"))
        })
    }

    pub fn operator(&self, graph: usize, op: usize) -> Result<&OperatorDef> {
        self.subgraph(graph)?.operators.get(op).ok_or_else(|| {
            Status::invalid_model(format!("operator index {op} out of range"))
        })
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub(crate) fn buffer_offset(&self, index: usize) -> Result<usize> {
        self.buffers
            .get(index)
            .map(|&(start, _)| start)
            .ok_or_else(|| Status::invalid_model(format!("buffer index {index} out of range")))
    }

    pub fn buffer_bytes(&self, index: usize) -> Result<&[u8]> {
        let (start, len) = *self.buffers.get(index).ok_or_else(|| {
            Status::invalid_model(format!("buffer index {index} out of range"))
        })?;
        Ok(&self.bytes.bytes()[start..start + len])
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            version: SCHEMA_VERSION,
            arena_len: self.arena_len,
            buffer_count: self.buffers.len(),
            subgraphs: self
                .subgraphs
                .iter()
                .map(|sg| SubgraphInfo {
                    tensors: sg.tensors.len(),
                    operators: sg.operators.len(),
                    inputs: sg.inputs.len(),
                    outputs: sg.outputs.len(),
                })
                .collect(),
        }
    }
}

type ParsedModel = (usize, Vec<(usize, usize)>, Vec<SubgraphDef>);

fn parse_model(bytes: &[u8]) -> Result<ParsedModel> {
    let mut header = ByteReader::new(bytes);
    let magic = [
        header.read_u8()?,
        header.read_u8()?,
        header.read_u8()?,
        header.read_u8()?,
    ];
    if magic != MAGIC {
        return Err(Status::invalid_model("bad magic, not a MIF model"));
    }
    let version = header.read_u32()?;
    if version != SCHEMA_VERSION {
        return Err(Status::invalid_model(format!(
            "unsupported schema version {version}, expected {SCHEMA_VERSION}"
        )));
    }
    let root = header.read_offset()?;

    let mut table = ByteReader::at(bytes, root)?;
    let arena_len = table.read_u32()? as usize;

    let subgraph_count = table.read_count()?;
    let mut subgraph_offsets = Vec::with_capacity(subgraph_count);
    for _ in 0..subgraph_count {
        subgraph_offsets.push(table.read_offset()?);
    }

    let buffer_count = table.read_count()?;
    let mut buffers = Vec::with_capacity(buffer_count);
    for _ in 0..buffer_count {
        let start = table.read_offset()?;
        let len = table.read_u32()? as usize;
        if start + len > bytes.len() {
            return Err(Status::invalid_model(format!(
                "buffer payload [{start}, {}) past end of model", start + len
            )));
        }
        buffers.push((start, len));
    }

    let mut subgraphs = Vec::with_capacity(subgraph_count);
    for offset in subgraph_offsets {
        subgraphs.push(parse_subgraph(bytes, offset)?);
    }
    Ok((arena_len, buffers, subgraphs))
}

fn parse_subgraph(bytes: &[u8], pos: usize) -> Result<SubgraphDef> {
    let mut table = ByteReader::at(bytes, pos)?;

    let tensor_count = table.read_count()?;
    let mut tensor_offsets = Vec::with_capacity(tensor_count);
    for _ in 0..tensor_count {
        tensor_offsets.push(table.read_offset()?);
    }

    let operator_count = table.read_count()?;
    let mut operator_offsets = Vec::with_capacity(operator_count);
    for _ in 0..operator_count {
        operator_offsets.push(table.read_offset()?);
    }

    let read_io = |table: &mut ByteReader| -> Result<Vec<usize>> {
        let count = table.read_count()?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let index = table.read_u32()? as usize;
            if index >= tensor_count {
                return Err(Status::invalid_model(format!(
                    "graph I/O tensor index {index} out of range ({tensor_count} tensors)"
                )));
            }
            out.push(index);
        }
        Ok(out)
    };
    let inputs = read_io(&mut table)?;
    let outputs = read_io(&mut table)?;

    let mut tensors = Vec::with_capacity(tensor_count);
    for offset in tensor_offsets {
        tensors.push(parse_tensor(bytes, offset)?);
    }
    let mut operators = Vec::with_capacity(operator_count);
    for offset in operator_offsets {
        operators.push(parse_operator(bytes, offset, tensor_count)?);
    }

    Ok(SubgraphDef {
        tensors,
        operators,
        inputs,
        outputs,
    })
}

const FLAG_QUANTIZED: u8 = 1 << 0;
const FLAG_PLANNED: u8 = 1 << 1;

fn parse_tensor(bytes: &[u8], pos: usize) -> Result<TensorDef> {
    let mut table = ByteReader::at(bytes, pos)?;
    let dtype_tag = table.read_u8()?;
    let dtype = DType::from_tag(dtype_tag)
        .ok_or_else(|| Status::invalid_model(format!("unknown dtype tag {dtype_tag}")))?;
    let flags = table.read_u8()?;
    let _reserved = table.read_u16()?;
    let buffer_raw = table.read_u32()?;
    let plan_raw = table.read_u32()?;

    let rank = table.read_count()?;
    let mut shape = Vec::with_capacity(rank);
    for _ in 0..rank {
        shape.push(table.read_u32()? as usize);
    }

    let quant = if flags & FLAG_QUANTIZED != 0 {
        let count = table.read_count()?;
        if count == 0 {
            return Err(Status::invalid_model(
                "quantization descriptor with zero scales",
            ));
        }
        let mut scales = Vec::with_capacity(count);
        for _ in 0..count {
            scales.push(table.read_f32()?);
        }
        let mut zero_points = Vec::with_capacity(count);
        for _ in 0..count {
            zero_points.push(table.read_i32()?);
        }
        let axis_raw = table.read_i32()?;
        let axis = if axis_raw < 0 {
            None
        } else {
            Some(axis_raw as usize)
        };
        Some(QuantParams {
            scales,
            zero_points,
            axis,
        })
    } else {
        None
    };

    Ok(TensorDef {
        dtype,
        shape,
        quant,
        buffer: (buffer_raw != u32::MAX).then_some(buffer_raw as usize),
        plan_offset: (flags & FLAG_PLANNED != 0).then_some(plan_raw as usize),
    })
}

pub(crate) const OPTIONS_NONE: u8 = 0;
pub(crate) const OPTIONS_ARITHMETIC: u8 = 1;
pub(crate) const OPTIONS_POOL_2D: u8 = 2;
pub(crate) const OPTIONS_STRIDED_SLICE: u8 = 3;
pub(crate) const OPTIONS_BRANCH: u8 = 4;
pub(crate) const OPTIONS_LOOP: u8 = 5;

fn parse_operator(bytes: &[u8], pos: usize, tensor_count: usize) -> Result<OperatorDef> {
    let mut table = ByteReader::at(bytes, pos)?;
    let opcode_tag = table.read_u16()?;
    let opcode = OpCode::from_tag(opcode_tag)
        .ok_or_else(|| Status::invalid_model(format!("unknown opcode tag {opcode_tag}")))?;
    let _reserved = table.read_u16()?;

    let input_count = table.read_count()?;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        let raw = table.read_i32()?;
        if raw < 0 {
            inputs.push(None);
            continue;
        }
        let index = raw as usize;
        if index >= tensor_count {
            return Err(Status::invalid_model(format!(
                "operator input tensor {index} out of range ({tensor_count} tensors)"
            )));
        }
        inputs.push(Some(index));
    }

    let output_count = table.read_count()?;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        let index = table.read_u32()? as usize;
        if index >= tensor_count {
            return Err(Status::invalid_model(format!(
                "operator output tensor {index} out of range ({tensor_count} tensors)"
            )));
        }
        outputs.push(index);
    }

    let options_tag = table.read_u8()?;
    let options = match options_tag {
        OPTIONS_NONE => OpOptions::None,
        OPTIONS_ARITHMETIC => {
            let act_tag = table.read_u8()?;
            let activation = ActivationKind::from_tag(act_tag).ok_or_else(|| {
                Status::invalid_model(format!("unknown activation tag {act_tag}"))
            })?;
            OpOptions::Arithmetic { activation }
        }
        OPTIONS_POOL_2D => {
            let padding_tag = table.read_u8()?;
            let padding = Padding::from_tag(padding_tag).ok_or_else(|| {
                Status::invalid_model(format!("unknown padding tag {padding_tag}"))
            })?;
            let act_tag = table.read_u8()?;
            let activation = ActivationKind::from_tag(act_tag).ok_or_else(|| {
                Status::invalid_model(format!("unknown activation tag {act_tag}"))
            })?;
            OpOptions::Pool2D {
                padding,
                activation,
                stride_w: table.read_u32()? as usize,
                stride_h: table.read_u32()? as usize,
                filter_w: table.read_u32()? as usize,
                filter_h: table.read_u32()? as usize,
            }
        }
        OPTIONS_STRIDED_SLICE => OpOptions::StridedSlice {
            begin_mask: table.read_u32()?,
            end_mask: table.read_u32()?,
            shrink_axis_mask: table.read_u32()?,
        },
        OPTIONS_BRANCH => OpOptions::Branch {
            then_subgraph: table.read_u32()? as usize,
            else_subgraph: table.read_u32()? as usize,
        },
        OPTIONS_LOOP => OpOptions::Loop {
            cond_subgraph: table.read_u32()? as usize,
            body_subgraph: table.read_u32()? as usize,
        },
        other => {
            return Err(Status::invalid_model(format!(
                "unknown options tag {other}"
            )))
        }
    };

    Ok(OperatorDef {
        opcode,
        inputs,
        outputs,
        options,
    })
}
