//! If and While, implemented as recursion into callee subgraphs.
//!
//! The executor owns the recursion; these kernels validate the call
//! signatures at configure time and drive tensor hand-off at execute time.
//! State hand-off copies go through the interpreter because source and
//! destination live in different runtime graphs.

use crate::dtype::DType;
use crate::model::OpOptions;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::common::check_nonempty;
use super::{Exec, KernelDef};

pub const IF: KernelDef = KernelDef {
    configure: configure_if,
    execute: Exec::If,
};

pub const WHILE: KernelDef = KernelDef {
    configure: configure_while,
    execute: Exec::While,
};

fn branch_graphs(options: &OpOptions) -> Result<(usize, usize)> {
    match options {
        OpOptions::Branch {
            then_subgraph,
            else_subgraph,
        } => Ok((*then_subgraph, *else_subgraph)),
        _ => Err(Status::unknown("branch operator without branch options")),
    }
}

fn loop_graphs(options: &OpOptions) -> Result<(usize, usize)> {
    match options {
        OpOptions::Loop {
            cond_subgraph,
            body_subgraph,
        } => Ok((*cond_subgraph, *body_subgraph)),
        _ => Err(Status::unknown("loop operator without loop options")),
    }
}

fn expect_same_signature(
    interp: &Interpreter,
    a: (usize, usize),
    b: (usize, usize),
    role: &str,
) -> Result<()> {
    let da = interp.model().tensor(a.0, a.1)?;
    let db = interp.model().tensor(b.0, b.1)?;
    if da.dtype != db.dtype || da.shape != db.shape {
        return Err(Status::invalid_argument(format!(
            "{role} signature mismatch: {:?} {:?} vs {:?} {:?}",
            da.dtype, da.shape, db.dtype, db.shape
        )));
    }
    Ok(())
}

struct CallSites {
    op_inputs: Vec<usize>,
    op_outputs: Vec<usize>,
}

fn call_sites(interp: &Interpreter, graph: usize, op: usize, skip: usize) -> Result<CallSites> {
    let info = interp.op_info(graph, op)?;
    let mut op_inputs = Vec::with_capacity(info.operator.inputs.len());
    for (slot, input) in info.operator.inputs.iter().enumerate().skip(skip) {
        let index = input.ok_or_else(|| {
            Status::invalid_argument(format!("control flow input {slot} is omitted"))
        })?;
        op_inputs.push(index);
    }
    Ok(CallSites {
        op_inputs,
        op_outputs: info.operator.outputs.clone(),
    })
}

fn configure_if(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (then_graph, else_graph) = {
        let info = interp.op_info(graph, op)?;
        let cond = info.input_def(0)?;
        if cond.dtype != DType::Bool || cond.flat_size() != 1 {
            return Err(Status::invalid_argument(
                "branch condition must be a Bool scalar",
            ));
        }
        branch_graphs(info.options())?
    };
    let sites = call_sites(interp, graph, op, 1)?;

    for callee in [then_graph, else_graph] {
        interp.configure_subgraph(callee)?;
        let callee_inputs = interp.model().subgraph(callee)?.inputs.clone();
        let callee_outputs = interp.model().subgraph(callee)?.outputs.clone();
        for (&site, &formal) in sites.op_inputs.iter().zip(&callee_inputs) {
            check_nonempty(&interp.model().tensor(graph, site)?.shape)?;
            expect_same_signature(interp, (graph, site), (callee, formal), "branch input")?;
        }
        for (&site, &formal) in sites.op_outputs.iter().zip(&callee_outputs) {
            expect_same_signature(interp, (graph, site), (callee, formal), "branch output")?;
        }
    }

    for &out in &sites.op_outputs {
        interp.bind_tensor(graph, out)?;
    }
    Ok(())
}

pub(crate) fn execute_if(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (cond_index, then_graph, else_graph) = {
        let info = interp.op_info(graph, op)?;
        let cond_index = info
            .operator
            .inputs
            .first()
            .copied()
            .flatten()
            .ok_or_else(|| Status::invalid_argument("branch operator without a condition"))?;
        let (t, e) = branch_graphs(info.options())?;
        (cond_index, t, e)
    };
    let sites = call_sites(interp, graph, op, 1)?;

    let taken = interp.read_first_byte(graph, cond_index)? != 0;
    let callee = if taken { then_graph } else { else_graph };
    let callee_inputs = interp.model().subgraph(callee)?.inputs.clone();
    let callee_outputs = interp.model().subgraph(callee)?.outputs.clone();

    for (&site, &formal) in sites.op_inputs.iter().zip(&callee_inputs) {
        interp.copy_tensor((graph, site), (callee, formal))?;
    }
    interp.run_subgraph(callee)?;
    for (&formal, &site) in callee_outputs.iter().zip(&sites.op_outputs) {
        interp.copy_tensor((callee, formal), (graph, site))?;
    }
    Ok(())
}

fn configure_while(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (cond_graph, body_graph) = {
        let info = interp.op_info(graph, op)?;
        loop_graphs(info.options())?
    };
    let sites = call_sites(interp, graph, op, 0)?;

    interp.configure_subgraph(cond_graph)?;
    interp.configure_subgraph(body_graph)?;

    let cond_inputs = interp.model().subgraph(cond_graph)?.inputs.clone();
    let body_inputs = interp.model().subgraph(body_graph)?.inputs.clone();
    let body_outputs = interp.model().subgraph(body_graph)?.outputs.clone();

    let mut state_bytes = 0usize;
    for i in 0..sites.op_inputs.len() {
        let site = sites.op_inputs[i];
        let def = interp.model().tensor(graph, site)?;
        check_nonempty(&def.shape)?;
        state_bytes += def.byte_len();
        expect_same_signature(interp, (graph, site), (cond_graph, cond_inputs[i]), "loop state")?;
        expect_same_signature(interp, (graph, site), (body_graph, body_inputs[i]), "loop state")?;
        expect_same_signature(interp, (graph, site), (body_graph, body_outputs[i]), "loop state")?;
        expect_same_signature(interp, (graph, site), (graph, sites.op_outputs[i]), "loop state")?;
    }

    // The body may write its outputs into arena slots that alias the next
    // iteration's inputs, so state rotation stages through scratch.
    interp.add_scratch(graph, op, state_bytes)?;

    for &out in &sites.op_outputs {
        interp.bind_tensor(graph, out)?;
    }
    Ok(())
}

pub(crate) fn execute_while(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    let (cond_graph, body_graph) = {
        let info = interp.op_info(graph, op)?;
        loop_graphs(info.options())?
    };
    let sites = call_sites(interp, graph, op, 0)?;

    let cond_inputs = interp.model().subgraph(cond_graph)?.inputs.clone();
    let cond_output = *interp
        .model()
        .subgraph(cond_graph)?
        .outputs
        .first()
        .ok_or_else(|| Status::invalid_model("loop condition graph has no output"))?;
    let body_inputs = interp.model().subgraph(body_graph)?.inputs.clone();
    let body_outputs = interp.model().subgraph(body_graph)?.outputs.clone();

    let state_lens: Vec<usize> = {
        let model = interp.model();
        let mut lens = Vec::with_capacity(sites.op_inputs.len());
        for &site in &sites.op_inputs {
            lens.push(model.tensor(graph, site)?.byte_len());
        }
        lens
    };

    for (&site, &formal) in sites.op_inputs.iter().zip(&cond_inputs) {
        interp.copy_tensor((graph, site), (cond_graph, formal))?;
    }

    loop {
        interp.run_subgraph(cond_graph)?;
        if interp.read_first_byte(cond_graph, cond_output)? == 0 {
            break;
        }

        for (&formal, &body_in) in cond_inputs.iter().zip(&body_inputs) {
            interp.copy_tensor((cond_graph, formal), (body_graph, body_in))?;
        }
        interp.run_subgraph(body_graph)?;

        // Stage the full next state in scratch before scattering it back,
        // since body outputs may alias cond inputs in the arena plan.
        let mut offset = 0usize;
        for (&out, &len) in body_outputs.iter().zip(&state_lens) {
            interp.stage_to_scratch(graph, op, offset, (body_graph, out))?;
            offset += len;
        }
        let mut offset = 0usize;
        for (&formal, &len) in cond_inputs.iter().zip(&state_lens) {
            interp.unstage_from_scratch(graph, op, offset, len, (cond_graph, formal))?;
            offset += len;
        }
    }

    for (&formal, &site) in cond_inputs.iter().zip(&sites.op_outputs) {
        interp.copy_tensor((cond_graph, formal), (graph, site))?;
    }
    Ok(())
}
