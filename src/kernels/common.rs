//! Shape and iteration helpers shared across kernels.

use crate::status::{Result, Status};

pub fn flat_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// All static shapes are dense; a zero extent means zero elements, which no
/// kernel here produces or consumes.
pub fn check_nonempty(shape: &[usize]) -> Result<()> {
    if shape.iter().any(|&d| d == 0) {
        return Err(Status::invalid_argument("tensor shape has a zero extent"));
    }
    Ok(())
}

pub fn expect_shape(declared: &[usize], inferred: &[usize]) -> Result<()> {
    if declared != inferred {
        return Err(Status::invalid_argument(format!(
            "declared output shape {declared:?} does not match inferred {inferred:?}"
        )));
    }
    Ok(())
}

/// Numpy-style broadcast of two shapes, right-aligned. Each trailing pair of
/// extents must be equal or one of them 1.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0usize; rank];
    for i in 0..rank {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        let d = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(Status::invalid_argument(format!(
                "shapes {a:?} and {b:?} are not broadcast-compatible"
            )));
        };
        out[rank - 1 - i] = d;
    }
    Ok(out)
}

/// Row-major element strides for a dense shape.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; shape.len()];
    let mut acc = 1usize;
    for i in (0..shape.len()).rev() {
        strides[i] = acc;
        acc *= shape[i];
    }
    strides
}

/// Strides for reading a tensor of `shape` as if it had `out_rank`
/// dimensions, with stride 0 on broadcast extents.
pub fn broadcast_strides(shape: &[usize], out_rank: usize) -> Vec<usize> {
    let strides = contiguous_strides(shape);
    let mut out = vec![0usize; out_rank];
    let lead = out_rank - shape.len();
    for i in 0..shape.len() {
        out[lead + i] = if shape[i] == 1 { 0 } else { strides[i] };
    }
    out
}

fn bump_index(index: &mut [usize], shape: &[usize]) {
    for d in (0..shape.len()).rev() {
        index[d] += 1;
        if index[d] < shape[d] {
            return;
        }
        index[d] = 0;
    }
}

/// Apply `f(x, y)` elementwise over two broadcast-compatible operands,
/// writing the result densely into `out`. The fast path handles the common
/// case of identical shapes without index bookkeeping.
pub fn map_binary<T: Copy, O>(
    a: &[T],
    a_shape: &[usize],
    b: &[T],
    b_shape: &[usize],
    out: &mut [O],
    f: impl Fn(T, T) -> O,
) -> Result<()> {
    if a_shape == b_shape {
        if a.len() != out.len() || b.len() != out.len() {
            return Err(Status::unknown("operand length does not match shape"));
        }
        for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
            *o = f(x, y);
        }
        return Ok(());
    }
    let out_shape = broadcast_shape(a_shape, b_shape)?;
    let total = flat_size(&out_shape);
    if out.len() != total {
        return Err(Status::unknown("output length does not match broadcast shape"));
    }
    let a_strides = broadcast_strides(a_shape, out_shape.len());
    let b_strides = broadcast_strides(b_shape, out_shape.len());
    let mut index = vec![0usize; out_shape.len()];
    for slot in out.iter_mut().take(total) {
        let mut a_off = 0usize;
        let mut b_off = 0usize;
        for d in 0..index.len() {
            a_off += index[d] * a_strides[d];
            b_off += index[d] * b_strides[d];
        }
        *slot = f(a[a_off], b[b_off]);
        bump_index(&mut index, &out_shape);
    }
    Ok(())
}
