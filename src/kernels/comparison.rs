//! Equal, NotEqual, and Greater producing Bool tensors.

use crate::dtype::DType;
use crate::runtime::graph::KernelIo;
use crate::runtime::Interpreter;
use crate::status::{Result, Status};

use super::common::map_binary;
use super::{cast_in, configure_broadcast_binary, Exec, KernelDef, OpInfo};

pub const EQUAL: KernelDef = KernelDef {
    configure: configure_comparison,
    execute: Exec::Kernel(|info, io| execute_comparison(info, io, CmpKind::Equal)),
};

pub const NOT_EQUAL: KernelDef = KernelDef {
    configure: configure_comparison,
    execute: Exec::Kernel(|info, io| execute_comparison(info, io, CmpKind::NotEqual)),
};

pub const GREATER: KernelDef = KernelDef {
    configure: configure_comparison,
    execute: Exec::Kernel(|info, io| execute_comparison(info, io, CmpKind::Greater)),
};

#[derive(Clone, Copy)]
enum CmpKind {
    Equal,
    NotEqual,
    Greater,
}

fn configure_comparison(interp: &mut Interpreter, graph: usize, op: usize) -> Result<()> {
    configure_broadcast_binary(interp, graph, op)
}

fn compare<T: Copy + PartialOrd + PartialEq>(kind: CmpKind, x: T, y: T) -> u8 {
    let hit = match kind {
        CmpKind::Equal => x == y,
        CmpKind::NotEqual => x != y,
        CmpKind::Greater => x > y,
    };
    hit as u8
}

fn execute_comparison(info: &OpInfo<'_>, io: &mut KernelIo<'_>, kind: CmpKind) -> Result<()> {
    let a_def = info.input_def(0)?;
    let b_def = info.input_def(1)?;

    match a_def.dtype {
        #[cfg(feature = "float")]
        DType::F32 => {
            let a = cast_in::<f32>(io.inputs[0])?;
            let b = cast_in::<f32>(io.inputs[1])?;
            let out = &mut *io.outputs[0];
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                compare(kind, x, y)
            })
        }
        DType::I8 => {
            let a = cast_in::<i8>(io.inputs[0])?;
            let b = cast_in::<i8>(io.inputs[1])?;
            let out = &mut *io.outputs[0];
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                compare(kind, x, y)
            })
        }
        DType::I32 => {
            let a = cast_in::<i32>(io.inputs[0])?;
            let b = cast_in::<i32>(io.inputs[1])?;
            let out = &mut *io.outputs[0];
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                compare(kind, x, y)
            })
        }
        DType::I64 => {
            let a = cast_in::<i64>(io.inputs[0])?;
            let b = cast_in::<i64>(io.inputs[1])?;
            let out = &mut *io.outputs[0];
            map_binary(a, &a_def.shape, b, &b_def.shape, out, |x, y| {
                compare(kind, x, y)
            })
        }
        other => Err(Status::unsupported_type(format!(
            "comparison not supported for {other:?}"
        ))),
    }
}
