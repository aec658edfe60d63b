//! Cast between element datatypes. Float-to-integer conversion saturates,
//! matching Rust `as` semantics; boolean results are 1 for any non-zero
//! source value.

use crate::dtype::DType;
use crate::runtime::graph::KernelIo;
use crate::status::{Result, Status};

use super::{cast_in, cast_out, configure_same_shape, Exec, KernelDef, OpInfo};

pub const CAST: KernelDef = KernelDef {
    configure: |interp, graph, op| configure_same_shape(interp, graph, op, false),
    execute: Exec::Kernel(execute_cast),
};

macro_rules! convert {
    ($io:expr, $in:ty, $out:ty, $f:expr) => {{
        let src = cast_in::<$in>($io.inputs[0])?;
        let dst = cast_out::<$out>(&mut *$io.outputs[0])?;
        for (o, &x) in dst.iter_mut().zip(src) {
            *o = $f(x);
        }
        Ok(())
    }};
}

fn execute_cast(info: &OpInfo<'_>, io: &mut KernelIo<'_>) -> Result<()> {
    let from = info.input_def(0)?.dtype;
    let to = info.output_def(0)?.dtype;
    match (from, to) {
        #[cfg(feature = "float")]
        (DType::F32, DType::F32) => convert!(io, f32, f32, |x| x),
        #[cfg(feature = "float")]
        (DType::F32, DType::I8) => convert!(io, f32, i8, |x: f32| x as i8),
        #[cfg(feature = "float")]
        (DType::F32, DType::I16) => convert!(io, f32, i16, |x: f32| x as i16),
        #[cfg(feature = "float")]
        (DType::F32, DType::I32) => convert!(io, f32, i32, |x: f32| x as i32),
        #[cfg(feature = "float")]
        (DType::F32, DType::I64) => convert!(io, f32, i64, |x: f32| x as i64),
        #[cfg(feature = "float")]
        (DType::F32, DType::Bool) => convert!(io, f32, u8, |x: f32| (x != 0.0) as u8),

        #[cfg(feature = "float")]
        (DType::I8, DType::F32) => convert!(io, i8, f32, |x: i8| x as f32),
        (DType::I8, DType::I8) => convert!(io, i8, i8, |x| x),
        (DType::I8, DType::I16) => convert!(io, i8, i16, |x: i8| x as i16),
        (DType::I8, DType::I32) => convert!(io, i8, i32, |x: i8| x as i32),
        (DType::I8, DType::I64) => convert!(io, i8, i64, |x: i8| x as i64),
        (DType::I8, DType::Bool) => convert!(io, i8, u8, |x: i8| (x != 0) as u8),

        #[cfg(feature = "float")]
        (DType::I16, DType::F32) => convert!(io, i16, f32, |x: i16| x as f32),
        (DType::I16, DType::I8) => convert!(io, i16, i8, |x: i16| x as i8),
        (DType::I16, DType::I16) => convert!(io, i16, i16, |x| x),
        (DType::I16, DType::I32) => convert!(io, i16, i32, |x: i16| x as i32),
        (DType::I16, DType::I64) => convert!(io, i16, i64, |x: i16| x as i64),
        (DType::I16, DType::Bool) => convert!(io, i16, u8, |x: i16| (x != 0) as u8),

        #[cfg(feature = "float")]
        (DType::I32, DType::F32) => convert!(io, i32, f32, |x: i32| x as f32),
        (DType::I32, DType::I8) => convert!(io, i32, i8, |x: i32| x as i8),
        (DType::I32, DType::I16) => convert!(io, i32, i16, |x: i32| x as i16),
        (DType::I32, DType::I32) => convert!(io, i32, i32, |x| x),
        (DType::I32, DType::I64) => convert!(io, i32, i64, |x: i32| x as i64),
        (DType::I32, DType::Bool) => convert!(io, i32, u8, |x: i32| (x != 0) as u8),

        #[cfg(feature = "float")]
        (DType::I64, DType::F32) => convert!(io, i64, f32, |x: i64| x as f32),
        (DType::I64, DType::I8) => convert!(io, i64, i8, |x: i64| x as i8),
        (DType::I64, DType::I16) => convert!(io, i64, i16, |x: i64| x as i16),
        (DType::I64, DType::I32) => convert!(io, i64, i32, |x: i64| x as i32),
        (DType::I64, DType::I64) => convert!(io, i64, i64, |x| x),
        (DType::I64, DType::Bool) => convert!(io, i64, u8, |x: i64| (x != 0) as u8),

        #[cfg(feature = "float")]
        (DType::Bool, DType::F32) => convert!(io, u8, f32, |x: u8| (x != 0) as u8 as f32),
        (DType::Bool, DType::I8) => convert!(io, u8, i8, |x: u8| (x != 0) as i8),
        (DType::Bool, DType::I16) => convert!(io, u8, i16, |x: u8| (x != 0) as i16),
        (DType::Bool, DType::I32) => convert!(io, u8, i32, |x: u8| (x != 0) as i32),
        (DType::Bool, DType::I64) => convert!(io, u8, i64, |x: u8| (x != 0) as i64),
        (DType::Bool, DType::Bool) => convert!(io, u8, u8, |x: u8| (x != 0) as u8),

        // Reachable only with the float feature disabled.
        #[allow(unreachable_patterns)]
        (from, to) => Err(Status::unsupported_type(format!(
            "cast from {from:?} to {to:?} is not supported"
        ))),
    }
}
