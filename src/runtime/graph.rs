//! Live per-subgraph state: storage bindings for every tensor plus the
//! configure bookkeeping the executor relies on.
//!
//! Tensors live in one contiguous store per subgraph and are referenced by
//! index everywhere else; there are no shared pointers, so graphs with
//! back-edges (control flow calling into ancestors) cannot form ownership
//! cycles.

use crate::memory::{AlignedBuf, MemoryManager};
use crate::model::{Model, OperatorDef};
use crate::status::{Result, Status};

/// Backing storage for one tensor. Exactly one kind is active at a time;
/// switching kinds is a lifecycle event performed by the executor, never by
/// kernels.
#[derive(Debug)]
pub enum Storage {
    /// Not yet bound; reading is an error.
    Unbound,
    /// Fixed range in the shared static-plan arena.
    Arena { offset: usize, len: usize },
    /// Dynamically allocated, owned by this tensor.
    Owned(AlignedBuf),
    /// Constant data in the serialized model (buffer index).
    Constant(usize),
}

#[derive(Debug)]
pub struct RuntimeTensor {
    pub storage: Storage,
    pub byte_len: usize,
}

#[derive(Debug)]
pub struct RuntimeGraph {
    pub tensors: Vec<RuntimeTensor>,
    pub configured: Vec<bool>,
    /// Scratch tensor ids registered per operator at configure time.
    pub scratch_of_op: Vec<Vec<usize>>,
}

impl RuntimeGraph {
    pub fn new(tensor_byte_lens: &[usize], operator_count: usize) -> Self {
        let tensors = tensor_byte_lens
            .iter()
            .map(|&byte_len| RuntimeTensor {
                storage: Storage::Unbound,
                byte_len,
            })
            .collect();
        Self {
            tensors,
            configured: vec![false; operator_count],
            scratch_of_op: vec![Vec::new(); operator_count],
        }
    }

    pub fn tensor(&self, index: usize) -> Result<&RuntimeTensor> {
        self.tensors
            .get(index)
            .ok_or_else(|| Status::unknown(format!("runtime tensor {index} out of range")))
    }

    pub fn tensor_mut(&mut self, index: usize) -> Result<&mut RuntimeTensor> {
        self.tensors
            .get_mut(index)
            .ok_or_else(|| Status::unknown(format!("runtime tensor {index} out of range")))
    }

    /// Register a non-observable scratch tensor owned by operator `op`;
    /// reclaimed right after the owning operator's execute call returns.
    pub fn add_scratch(&mut self, op: usize, byte_len: usize) -> usize {
        let id = self.tensors.len();
        self.tensors.push(RuntimeTensor {
            storage: Storage::Unbound,
            byte_len,
        });
        self.scratch_of_op[op].push(id);
        id
    }
}

/// Borrowed byte views over one operator's tensors for the duration of a
/// single execute call.
pub struct KernelIo<'a> {
    pub inputs: Vec<&'a [u8]>,
    pub outputs: Vec<&'a mut [u8]>,
}

fn input_span(
    model: &Model,
    memory: &MemoryManager,
    graph: &RuntimeGraph,
    index: usize,
) -> Result<(*const u8, usize)> {
    let tensor = graph.tensor(index)?;
    match &tensor.storage {
        Storage::Constant(buffer) => {
            let bytes = model.buffer_bytes(*buffer)?;
            Ok((bytes.as_ptr(), bytes.len()))
        }
        Storage::Arena { offset, len } => {
            let bytes = &memory.arena()[*offset..*offset + *len];
            Ok((bytes.as_ptr(), bytes.len()))
        }
        Storage::Owned(buf) => Ok((buf.bytes().as_ptr(), buf.len())),
        Storage::Unbound => Err(Status::invalid_argument(format!(
            "tensor {index} read before it was bound to storage"
        ))),
    }
}

fn output_span(
    memory: &mut MemoryManager,
    graph: &mut RuntimeGraph,
    index: usize,
) -> Result<(*mut u8, usize)> {
    // Storage kind decides the span; constants are never writable.
    match &graph.tensor(index)?.storage {
        Storage::Constant(_) => {
            return Err(Status::invalid_argument(format!(
                "tensor {index} is constant and cannot be written"
            )))
        }
        Storage::Unbound => {
            return Err(Status::invalid_argument(format!(
                "tensor {index} written before it was bound to storage"
            )))
        }
        Storage::Arena { offset, len } => {
            let (offset, len) = (*offset, *len);
            let bytes = &mut memory.arena_mut()[offset..offset + len];
            return Ok((bytes.as_mut_ptr(), bytes.len()));
        }
        Storage::Owned(_) => {}
    }
    match &mut graph.tensor_mut(index)?.storage {
        Storage::Owned(buf) => {
            let bytes = buf.bytes_mut();
            Ok((bytes.as_mut_ptr(), bytes.len()))
        }
        _ => unreachable!("storage kind checked above"),
    }
}

#[cfg(debug_assertions)]
fn spans_overlap(a: (*const u8, usize), b: (*const u8, usize)) -> bool {
    let (a_start, a_len) = (a.0 as usize, a.1);
    let (b_start, b_len) = (b.0 as usize, b.1);
    a_start < b_start + b_len && b_start < a_start + a_len
}

/// Resolve one operator's tensors into borrowed byte slices.
///
/// Safety of the pointer reconstruction rests on the static-plan contract:
/// load-time verification guarantees no tensor is both an input and an
/// output of one operator, and tensors live at the same time never share
/// arena bytes. Release builds trust the offline planner; debug builds
/// re-check the spans handed out here and fail with `UnknownError` on any
/// intersection.
pub(crate) fn kernel_io<'a>(
    model: &'a Model,
    memory: &'a mut MemoryManager,
    graph: &'a mut RuntimeGraph,
    operator: &OperatorDef,
) -> Result<KernelIo<'a>> {
    let mut input_spans = Vec::with_capacity(operator.inputs.len());
    for (slot, input) in operator.inputs.iter().enumerate() {
        let index = input.ok_or_else(|| {
            Status::invalid_argument(format!("required input {slot} is omitted"))
        })?;
        input_spans.push(input_span(model, memory, graph, index)?);
    }

    let mut output_spans = Vec::with_capacity(operator.outputs.len());
    for &index in &operator.outputs {
        output_spans.push(output_span(memory, graph, index)?);
    }

    #[cfg(debug_assertions)]
    {
        for (i, &a) in output_spans.iter().enumerate() {
            let a = (a.0 as *const u8, a.1);
            for &b in &input_spans {
                if spans_overlap(a, b) {
                    return Err(Status::unknown(
                        "static plan violation: writable tensor overlaps a live input",
                    ));
                }
            }
            for &b in &output_spans[i + 1..] {
                if spans_overlap(a, (b.0 as *const u8, b.1)) {
                    return Err(Status::unknown(
                        "static plan violation: writable tensors overlap",
                    ));
                }
            }
        }
    }

    unsafe {
        Ok(KernelIo {
            inputs: input_spans
                .iter()
                .map(|&(ptr, len)| std::slice::from_raw_parts(ptr, len))
                .collect(),
            outputs: output_spans
                .iter()
                .map(|&(ptr, len)| std::slice::from_raw_parts_mut(ptr, len))
                .collect(),
        })
    }
}

/// Copy a tensor's current bytes into `dst` (used for cross-graph copies in
/// control flow; `dst` keeps its capacity across calls).
pub(crate) fn read_tensor_into(
    model: &Model,
    memory: &MemoryManager,
    graph: &RuntimeGraph,
    index: usize,
    dst: &mut Vec<u8>,
) -> Result<()> {
    let (ptr, len) = input_span(model, memory, graph, index)?;
    // The span borrows from model/memory/graph which all outlive this call.
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
    dst.clear();
    dst.extend_from_slice(bytes);
    Ok(())
}

pub(crate) fn write_tensor(
    memory: &mut MemoryManager,
    graph: &mut RuntimeGraph,
    index: usize,
    src: &[u8],
) -> Result<()> {
    let (ptr, len) = output_span(memory, graph, index)?;
    if len != src.len() {
        return Err(Status::invalid_argument(format!(
            "tensor {index} holds {len} bytes, attempted to write {}",
            src.len()
        )));
    }
    let bytes = unsafe { std::slice::from_raw_parts_mut(ptr, len) };
    bytes.copy_from_slice(src);
    Ok(())
}
