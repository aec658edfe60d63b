//! The interpreter: configure once, execute many times.
//!
//! Configure walks each operator, validates it, and binds output storage,
//! either into the planned arena slot or a dynamically allocated buffer.
//! Execute resolves kernel views over already-bound storage and dispatches;
//! it performs no shape inference and, past the first run's dynamic
//! bindings, no allocation.

use crate::kernels::{kernel_for, Exec, OpInfo};
use crate::memory::{MemoryConfig, MemoryManager};
use crate::model::{Model, ModelInfo};
use crate::runtime::graph::{
    kernel_io, read_tensor_into, write_tensor, RuntimeGraph, Storage,
};
use crate::status::{Result, Status};
use crate::{error, trace};

#[derive(Clone, Copy, PartialEq, Eq)]
enum ConfigState {
    Idle,
    InProgress,
    Done,
}

pub struct Interpreter {
    model: Model,
    memory: MemoryManager,
    graphs: Vec<RuntimeGraph>,
    config_state: Vec<ConfigState>,
    // Reused bounce buffer for cross-graph tensor copies in control flow.
    copy_buf: Vec<u8>,
}

impl Interpreter {
    /// Load a serialized model and prepare runtime state for every
    /// subgraph. Constants and graph inputs are bound here; operator
    /// outputs bind during configure.
    pub fn load(raw: Vec<u8>) -> Result<Interpreter> {
        Interpreter::load_with_config(raw, MemoryConfig::default())
    }

    pub fn load_with_config(raw: Vec<u8>, config: MemoryConfig) -> Result<Interpreter> {
        let model = Model::load(raw)?;
        let memory = MemoryManager::new(model.arena_len(), config);

        let mut graphs = Vec::with_capacity(model.subgraph_count());
        for g in 0..model.subgraph_count() {
            let subgraph = model.subgraph(g)?;
            let byte_lens: Vec<usize> = subgraph.tensors.iter().map(|t| t.byte_len()).collect();
            graphs.push(RuntimeGraph::new(&byte_lens, subgraph.operators.len()));
        }

        let mut interp = Interpreter {
            config_state: vec![ConfigState::Idle; graphs.len()],
            model,
            memory,
            graphs,
            copy_buf: Vec::new(),
        };

        for g in 0..interp.model.subgraph_count() {
            let tensor_count = interp.model.subgraph(g)?.tensors.len();
            for t in 0..tensor_count {
                if let Some(buffer) = interp.model.tensor(g, t)?.buffer {
                    interp.graphs[g].tensor_mut(t)?.storage = Storage::Constant(buffer);
                }
            }
            let inputs = interp.model.subgraph(g)?.inputs.clone();
            for t in inputs {
                interp.bind_tensor(g, t)?;
            }
        }
        Ok(interp)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn info(&self) -> ModelInfo {
        self.model.info()
    }

    /// Validate and prepare every operator in the main graph, recursing
    /// into control-flow callees. Idempotent.
    pub fn configure(&mut self) -> Result<()> {
        self.configure_subgraph(0)
    }

    /// Run one inference over the main graph.
    pub fn execute(&mut self) -> Result<()> {
        self.configure()?;
        let result = self.run_subgraph(0);
        if let Err(status) = &result {
            error!("inference failed: {status}");
        }
        result
    }

    pub(crate) fn configure_subgraph(&mut self, graph: usize) -> Result<()> {
        match *self
            .config_state
            .get(graph)
            .ok_or_else(|| Status::invalid_model(format!("subgraph {graph} out of range")))?
        {
            ConfigState::Done => return Ok(()),
            ConfigState::InProgress => {
                return Err(Status::invalid_model(format!(
                    "subgraph {graph} calls itself through control flow"
                )))
            }
            ConfigState::Idle => {}
        }
        self.config_state[graph] = ConfigState::InProgress;

        let op_count = self.model.subgraph(graph)?.operators.len();
        for op in 0..op_count {
            if self.graphs[graph].configured[op] {
                continue;
            }
            let opcode = self.model.operator(graph, op)?.opcode;
            trace!("configure g{graph} op{op} {opcode:?}");
            let kernel = kernel_for(opcode)?;
            (kernel.configure)(self, graph, op)?;
            self.graphs[graph].configured[op] = true;
        }

        self.config_state[graph] = ConfigState::Done;
        Ok(())
    }

    pub(crate) fn run_subgraph(&mut self, graph: usize) -> Result<()> {
        let op_count = self.model.subgraph(graph)?.operators.len();
        for op in 0..op_count {
            self.bind_scratch(graph, op)?;
            let result = self.execute_op(graph, op);
            self.release_scratch(graph, op)?;
            result?;
        }
        Ok(())
    }

    fn execute_op(&mut self, graph: usize, op: usize) -> Result<()> {
        let opcode = self.model.operator(graph, op)?.opcode;
        trace!("execute g{graph} op{op} {opcode:?}");
        let kernel = kernel_for(opcode)?;
        match kernel.execute {
            Exec::Kernel(execute) => {
                let Interpreter {
                    ref model,
                    ref mut memory,
                    ref mut graphs,
                    ..
                } = *self;
                let subgraph = model.subgraph(graph)?;
                let operator = subgraph
                    .operators
                    .get(op)
                    .ok_or_else(|| Status::unknown(format!("operator {op} out of range")))?;
                let mut io = kernel_io(model, memory, &mut graphs[graph], operator)?;
                let info = OpInfo { subgraph, operator };
                execute(&info, &mut io)
            }
            Exec::If => crate::kernels::control_flow::execute_if(self, graph, op),
            Exec::While => crate::kernels::control_flow::execute_while(self, graph, op),
        }
    }

    /// Bind a tensor's storage if it is still unbound: planned tensors land
    /// at their arena slot, everything else gets a dynamic allocation.
    pub(crate) fn bind_tensor(&mut self, graph: usize, tensor: usize) -> Result<()> {
        if !matches!(
            self.graphs[graph].tensor(tensor)?.storage,
            Storage::Unbound
        ) {
            return Ok(());
        }
        let def = self.model.tensor(graph, tensor)?;
        let byte_len = def.byte_len();
        let storage = match def.plan_offset {
            // The plan range was validated against the arena at load.
            Some(offset) => Storage::Arena {
                offset,
                len: byte_len,
            },
            None => Storage::Owned(self.memory.allocate(byte_len)?),
        };
        self.graphs[graph].tensor_mut(tensor)?.storage = storage;
        Ok(())
    }

    pub(crate) fn op_info(&self, graph: usize, op: usize) -> Result<OpInfo<'_>> {
        let subgraph = self.model.subgraph(graph)?;
        let operator = subgraph
            .operators
            .get(op)
            .ok_or_else(|| Status::unknown(format!("operator {op} out of range")))?;
        Ok(OpInfo { subgraph, operator })
    }

    /// Read a constant I32 tensor's elements, used by kernels whose
    /// parameters arrive as constant inputs.
    pub(crate) fn constant_i32s(&self, graph: usize, tensor: usize) -> Result<Vec<i32>> {
        let def = self.model.tensor(graph, tensor)?;
        if def.dtype != crate::dtype::DType::I32 {
            return Err(Status::invalid_argument(format!(
                "expected an I32 parameter tensor, found {:?}",
                def.dtype
            )));
        }
        let buffer = def
            .buffer
            .ok_or_else(|| Status::invalid_argument("parameter tensor must be constant"))?;
        let bytes = self.model.buffer_bytes(buffer)?;
        let values = bytemuck::try_cast_slice::<u8, i32>(bytes)
            .map_err(|_| Status::invalid_model("constant buffer is not valid I32 data"))?;
        Ok(values.to_vec())
    }

    /// Register a scratch buffer for an operator during configure. Scratch
    /// storage binds just before the operator runs and releases after.
    pub(crate) fn add_scratch(&mut self, graph: usize, op: usize, byte_len: usize) -> Result<()> {
        let runtime = self
            .graphs
            .get_mut(graph)
            .ok_or_else(|| Status::unknown(format!("subgraph {graph} out of range")))?;
        runtime.add_scratch(op, byte_len);
        Ok(())
    }

    fn bind_scratch(&mut self, graph: usize, op: usize) -> Result<()> {
        let ids = self.graphs[graph].scratch_of_op[op].clone();
        for id in ids {
            let byte_len = self.graphs[graph].tensor(id)?.byte_len;
            if matches!(self.graphs[graph].tensor(id)?.storage, Storage::Unbound) {
                let buf = self.memory.allocate(byte_len)?;
                self.graphs[graph].tensor_mut(id)?.storage = Storage::Owned(buf);
            }
        }
        Ok(())
    }

    fn release_scratch(&mut self, graph: usize, op: usize) -> Result<()> {
        let ids = self.graphs[graph].scratch_of_op[op].clone();
        for id in ids {
            let tensor = self.graphs[graph].tensor_mut(id)?;
            let storage = std::mem::replace(&mut tensor.storage, Storage::Unbound);
            if let Storage::Owned(buf) = storage {
                self.memory.release(buf);
            }
        }
        Ok(())
    }

    /// Copy one tensor's bytes to another, possibly across runtime graphs.
    pub(crate) fn copy_tensor(&mut self, src: (usize, usize), dst: (usize, usize)) -> Result<()> {
        let mut buf = std::mem::take(&mut self.copy_buf);
        {
            let Interpreter {
                ref model,
                ref memory,
                ref graphs,
                ..
            } = *self;
            read_tensor_into(model, memory, &graphs[src.0], src.1, &mut buf)?;
        }
        write_tensor(&mut self.memory, &mut self.graphs[dst.0], dst.1, &buf)?;
        self.copy_buf = buf;
        Ok(())
    }

    pub(crate) fn read_first_byte(&mut self, graph: usize, tensor: usize) -> Result<u8> {
        let mut buf = std::mem::take(&mut self.copy_buf);
        {
            let Interpreter {
                ref model,
                ref memory,
                ref graphs,
                ..
            } = *self;
            read_tensor_into(model, memory, &graphs[graph], tensor, &mut buf)?;
        }
        let byte = buf
            .first()
            .copied()
            .ok_or_else(|| Status::unknown("condition tensor is empty"))?;
        self.copy_buf = buf;
        Ok(byte)
    }

    /// Copy a tensor into a slice of the operator's scratch buffer.
    pub(crate) fn stage_to_scratch(
        &mut self,
        graph: usize,
        op: usize,
        offset: usize,
        src: (usize, usize),
    ) -> Result<()> {
        let mut buf = std::mem::take(&mut self.copy_buf);
        {
            let Interpreter {
                ref model,
                ref memory,
                ref graphs,
                ..
            } = *self;
            read_tensor_into(model, memory, &graphs[src.0], src.1, &mut buf)?;
        }
        let scratch = self.scratch_bytes_mut(graph, op)?;
        let end = offset + buf.len();
        if end > scratch.len() {
            return Err(Status::unknown("scratch staging range out of bounds"));
        }
        scratch[offset..end].copy_from_slice(&buf);
        self.copy_buf = buf;
        Ok(())
    }

    /// Copy a slice of the operator's scratch buffer back out to a tensor.
    pub(crate) fn unstage_from_scratch(
        &mut self,
        graph: usize,
        op: usize,
        offset: usize,
        len: usize,
        dst: (usize, usize),
    ) -> Result<()> {
        let mut buf = std::mem::take(&mut self.copy_buf);
        {
            let scratch = self.scratch_bytes_mut(graph, op)?;
            let end = offset + len;
            if end > scratch.len() {
                return Err(Status::unknown("scratch staging range out of bounds"));
            }
            buf.clear();
            buf.extend_from_slice(&scratch[offset..end]);
        }
        write_tensor(&mut self.memory, &mut self.graphs[dst.0], dst.1, &buf)?;
        self.copy_buf = buf;
        Ok(())
    }

    fn scratch_bytes_mut(&mut self, graph: usize, op: usize) -> Result<&mut [u8]> {
        let id = self.graphs[graph]
            .scratch_of_op
            .get(op)
            .and_then(|ids| ids.first())
            .copied()
            .ok_or_else(|| Status::unknown("operator has no scratch buffer"))?;
        match &mut self.graphs[graph].tensor_mut(id)?.storage {
            Storage::Owned(buf) => Ok(buf.bytes_mut()),
            _ => Err(Status::unknown("scratch buffer is not bound")),
        }
    }

    pub fn input_count(&self) -> usize {
        self.model
            .subgraph(0)
            .map(|g| g.inputs.len())
            .unwrap_or(0)
    }

    pub fn output_count(&self) -> usize {
        self.model
            .subgraph(0)
            .map(|g| g.outputs.len())
            .unwrap_or(0)
    }

    pub fn input_byte_len(&self, index: usize) -> Result<usize> {
        let tensor = self.main_input(index)?;
        Ok(self.model.tensor(0, tensor)?.byte_len())
    }

    pub fn output_byte_len(&self, index: usize) -> Result<usize> {
        let tensor = self.main_output(index)?;
        Ok(self.model.tensor(0, tensor)?.byte_len())
    }

    /// Mutable view of a main-graph input's bytes, for staging data before
    /// `execute`.
    pub fn input_bytes_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let tensor = self.main_input(index)?;
        let arena_slot = match &self.graphs[0].tensor(tensor)?.storage {
            Storage::Arena { offset, len } => Some((*offset, *len)),
            Storage::Owned(_) => None,
            _ => {
                return Err(Status::invalid_argument(format!(
                    "input {index} has no writable storage"
                )))
            }
        };
        match arena_slot {
            Some((offset, len)) => Ok(&mut self.memory.arena_mut()[offset..offset + len]),
            None => match &mut self.graphs[0].tensor_mut(tensor)?.storage {
                Storage::Owned(buf) => Ok(buf.bytes_mut()),
                _ => Err(Status::unknown("input storage changed between reads")),
            },
        }
    }

    /// Copy typed elements into a main-graph input.
    pub fn write_input<T: bytemuck::Pod>(&mut self, index: usize, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let dst = self.input_bytes_mut(index)?;
        if dst.len() != bytes.len() {
            return Err(Status::invalid_argument(format!(
                "input {index} holds {} bytes, attempted to write {}",
                dst.len(),
                bytes.len()
            )));
        }
        dst.copy_from_slice(bytes);
        Ok(())
    }

    pub fn output_bytes(&self, index: usize) -> Result<&[u8]> {
        let tensor = self.main_output(index)?;
        match &self.graphs[0].tensor(tensor)?.storage {
            Storage::Arena { offset, len } => Ok(&self.memory.arena()[*offset..*offset + *len]),
            Storage::Owned(buf) => Ok(buf.bytes()),
            Storage::Constant(buffer) => self.model.buffer_bytes(*buffer),
            Storage::Unbound => Err(Status::invalid_argument(format!(
                "output {index} read before the graph was configured"
            ))),
        }
    }

    /// Typed view over a main-graph output.
    pub fn output_as<T: bytemuck::Pod>(&self, index: usize) -> Result<&[T]> {
        let bytes = self.output_bytes(index)?;
        bytemuck::try_cast_slice(bytes)
            .map_err(|_| Status::unknown(format!("misaligned view over output {index}")))
    }

    fn main_input(&self, index: usize) -> Result<usize> {
        self.model
            .subgraph(0)?
            .inputs
            .get(index)
            .copied()
            .ok_or_else(|| Status::invalid_argument(format!("input {index} out of range")))
    }

    fn main_output(&self, index: usize) -> Result<usize> {
        self.model
            .subgraph(0)?
            .outputs
            .get(index)
            .copied()
            .ok_or_else(|| Status::invalid_argument(format!("output {index} out of range")))
    }
}
