//! Writer side of the MIF wire format.
//!
//! Assembles a serialized model from the same definition structs the loader
//! decodes into, so fixtures and tooling round-trip through one schema.
//! Table references are written as placeholder deltas and patched once the
//! target position is known. Buffer payloads are padded to an 8-byte
//! boundary so the loader can hand out alignment-safe typed views.

use anyhow::{bail, Result};

use crate::model::{
    OpOptions, OperatorDef, SubgraphDef, TensorDef, MAGIC, OPTIONS_ARITHMETIC, OPTIONS_BRANCH,
    OPTIONS_LOOP, OPTIONS_NONE, OPTIONS_POOL_2D, OPTIONS_STRIDED_SLICE, SCHEMA_VERSION,
};

#[derive(Debug, Default)]
pub struct ModelBuilder {
    arena_len: usize,
    buffers: Vec<Vec<u8>>,
    subgraphs: Vec<SubgraphDef>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_arena_len(&mut self, len: usize) -> &mut Self {
        self.arena_len = len;
        self
    }

    /// Register a constant payload; returns the buffer index tensors use to
    /// reference it.
    pub fn add_buffer(&mut self, data: &[u8]) -> usize {
        self.buffers.push(data.to_vec());
        self.buffers.len() - 1
    }

    /// Append a subgraph; index 0 is the main graph.
    pub fn add_subgraph(&mut self, subgraph: SubgraphDef) -> usize {
        self.subgraphs.push(subgraph);
        self.subgraphs.len() - 1
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        write_u32(&mut buf, SCHEMA_VERSION);
        let root_slot = reserve_delta(&mut buf);
        patch_delta(&mut buf, root_slot)?;

        write_u32(&mut buf, u32::try_from(self.arena_len)?);
        write_u32(&mut buf, u32::try_from(self.subgraphs.len())?);
        let subgraph_slots: Vec<usize> = (0..self.subgraphs.len())
            .map(|_| reserve_delta(&mut buf))
            .collect();
        write_u32(&mut buf, u32::try_from(self.buffers.len())?);
        let mut buffer_slots = Vec::with_capacity(self.buffers.len());
        for data in &self.buffers {
            buffer_slots.push(reserve_delta(&mut buf));
            write_u32(&mut buf, u32::try_from(data.len())?);
        }

        for (subgraph, slot) in self.subgraphs.iter().zip(subgraph_slots) {
            patch_delta(&mut buf, slot)?;
            write_subgraph(&mut buf, subgraph)?;
        }

        for (data, slot) in self.buffers.iter().zip(buffer_slots) {
            while buf.len() % 8 != 0 {
                buf.push(0);
            }
            patch_delta(&mut buf, slot)?;
            buf.extend_from_slice(data);
        }

        Ok(buf)
    }
}

fn write_subgraph(buf: &mut Vec<u8>, subgraph: &SubgraphDef) -> Result<()> {
    write_u32(buf, u32::try_from(subgraph.tensors.len())?);
    let tensor_slots: Vec<usize> = (0..subgraph.tensors.len())
        .map(|_| reserve_delta(buf))
        .collect();
    write_u32(buf, u32::try_from(subgraph.operators.len())?);
    let operator_slots: Vec<usize> = (0..subgraph.operators.len())
        .map(|_| reserve_delta(buf))
        .collect();

    write_u32(buf, u32::try_from(subgraph.inputs.len())?);
    for &index in &subgraph.inputs {
        write_u32(buf, u32::try_from(index)?);
    }
    write_u32(buf, u32::try_from(subgraph.outputs.len())?);
    for &index in &subgraph.outputs {
        write_u32(buf, u32::try_from(index)?);
    }

    for (tensor, slot) in subgraph.tensors.iter().zip(tensor_slots) {
        patch_delta(buf, slot)?;
        write_tensor(buf, tensor)?;
    }
    for (operator, slot) in subgraph.operators.iter().zip(operator_slots) {
        patch_delta(buf, slot)?;
        write_operator(buf, operator)?;
    }
    Ok(())
}

fn write_tensor(buf: &mut Vec<u8>, tensor: &TensorDef) -> Result<()> {
    let mut flags = 0u8;
    if tensor.quant.is_some() {
        flags |= 1 << 0;
    }
    if tensor.plan_offset.is_some() {
        flags |= 1 << 1;
    }
    buf.push(tensor.dtype.tag());
    buf.push(flags);
    write_u16(buf, 0);
    match tensor.buffer {
        Some(index) => write_u32(buf, u32::try_from(index)?),
        None => write_u32(buf, u32::MAX),
    }
    write_u32(buf, u32::try_from(tensor.plan_offset.unwrap_or(0))?);
    write_u32(buf, u32::try_from(tensor.shape.len())?);
    for &dim in &tensor.shape {
        write_u32(buf, u32::try_from(dim)?);
    }
    if let Some(quant) = &tensor.quant {
        if quant.scales.len() != quant.zero_points.len() {
            bail!("quantization scales and zero points differ in length");
        }
        write_u32(buf, u32::try_from(quant.scales.len())?);
        for &scale in &quant.scales {
            buf.extend_from_slice(&scale.to_le_bytes());
        }
        for &zp in &quant.zero_points {
            write_i32(buf, zp);
        }
        match quant.axis {
            Some(axis) => write_i32(buf, i32::try_from(axis)?),
            None => write_i32(buf, -1),
        }
    }
    Ok(())
}

fn write_operator(buf: &mut Vec<u8>, operator: &OperatorDef) -> Result<()> {
    write_u16(buf, operator.opcode.tag());
    write_u16(buf, 0);
    write_u32(buf, u32::try_from(operator.inputs.len())?);
    for input in &operator.inputs {
        match input {
            Some(index) => write_i32(buf, i32::try_from(*index)?),
            None => write_i32(buf, -1),
        }
    }
    write_u32(buf, u32::try_from(operator.outputs.len())?);
    for &output in &operator.outputs {
        write_u32(buf, u32::try_from(output)?);
    }
    match &operator.options {
        OpOptions::None => buf.push(OPTIONS_NONE),
        OpOptions::Arithmetic { activation } => {
            buf.push(OPTIONS_ARITHMETIC);
            buf.push(activation.tag());
        }
        OpOptions::Pool2D {
            padding,
            activation,
            stride_w,
            stride_h,
            filter_w,
            filter_h,
        } => {
            buf.push(OPTIONS_POOL_2D);
            buf.push(padding.tag());
            buf.push(activation.tag());
            write_u32(buf, u32::try_from(*stride_w)?);
            write_u32(buf, u32::try_from(*stride_h)?);
            write_u32(buf, u32::try_from(*filter_w)?);
            write_u32(buf, u32::try_from(*filter_h)?);
        }
        OpOptions::StridedSlice {
            begin_mask,
            end_mask,
            shrink_axis_mask,
        } => {
            buf.push(OPTIONS_STRIDED_SLICE);
            write_u32(buf, *begin_mask);
            write_u32(buf, *end_mask);
            write_u32(buf, *shrink_axis_mask);
        }
        OpOptions::Branch {
            then_subgraph,
            else_subgraph,
        } => {
            buf.push(OPTIONS_BRANCH);
            write_u32(buf, u32::try_from(*then_subgraph)?);
            write_u32(buf, u32::try_from(*else_subgraph)?);
        }
        OpOptions::Loop {
            cond_subgraph,
            body_subgraph,
        } => {
            buf.push(OPTIONS_LOOP);
            write_u32(buf, u32::try_from(*cond_subgraph)?);
            write_u32(buf, u32::try_from(*body_subgraph)?);
        }
    }
    Ok(())
}

fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn reserve_delta(buf: &mut Vec<u8>) -> usize {
    let slot = buf.len();
    write_i32(buf, 0);
    slot
}

fn patch_delta(buf: &mut Vec<u8>, slot: usize) -> Result<()> {
    let target = buf.len();
    let delta = i32::try_from(target as i64 - slot as i64)?;
    buf[slot..slot + 4].copy_from_slice(&delta.to_le_bytes());
    Ok(())
}
