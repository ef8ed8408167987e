// CPU Backend — native compute backend over plain host buffers
//
// This crate provides the reference implementation of the Stoat Backend
// trait. Storage is a Vec<T> per dtype; kernels walk layouts through
// StridedIter, so sliced, transposed, and broadcast views are read in
// logical order without materializing them first.
//
// ARCHITECTURE:
// - CpuDevice is a unit struct: host memory needs no handle
// - CpuStorage is an enum over Vec<T> for each supported dtype
// - Element-wise kernels are generic and strided; matmul, reductions, and
//   index_select first densify their inputs with ensure_contiguous
// - Matmul computes output rows in parallel with rayon
// - Random number generation uses rand/rand_distr on the calling thread
//
// USAGE:
//   let a = Array::<CpuBackend>::zeros((2, 3), DType::F64, &CpuDevice)?;

use rayon::prelude::*;
use std::fmt;

use stoat_core::array::Array;
use stoat_core::backend::{
    Backend, BackendDevice, BackendStorage, BinaryOp, CmpOp, ReduceOp, UnaryOp,
};
use stoat_core::dtype::{DType, WithDType};
use stoat_core::error::{Error, Result};
use stoat_core::layout::Layout;
use stoat_core::shape::Shape;

// CpuDevice

/// The CPU device. A unit struct: every CpuStorage lives in host memory,
/// so there is nothing to select or initialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDevice;

impl BackendDevice for CpuDevice {
    fn name(&self) -> String {
        "cpu".to_string()
    }
}

// CpuStorage — enum over host buffers, one variant per dtype

/// CPU storage: an owned, dtype-tagged flat buffer.
#[derive(Clone)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    I64(Vec<i64>),
}

impl fmt::Debug for CpuStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuStorage::F32(v) => write!(f, "CpuStorage::F32(len={})", v.len()),
            CpuStorage::F64(v) => write!(f, "CpuStorage::F64(len={})", v.len()),
            CpuStorage::U8(v) => write!(f, "CpuStorage::U8(len={})", v.len()),
            CpuStorage::I64(v) => write!(f, "CpuStorage::I64(len={})", v.len()),
        }
    }
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::I64(_) => DType::I64,
        }
    }

    fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
            CpuStorage::I64(v) => v.len(),
        }
    }
}

// CpuBackend

/// The CPU compute backend. Zero-sized; all state lives in CpuStorage.
#[derive(Debug, Clone)]
pub struct CpuBackend;

/// Arrays on the CPU backend.
pub type CpuArray = Array<CpuBackend>;

// Kernel helpers

/// Gather the elements a layout addresses into a fresh dense Vec.
fn gather<T: Copy>(data: &[T], layout: &Layout) -> Vec<T> {
    layout.strided_indices().map(|i| data[i]).collect()
}

/// Clone the buffer when the layout already covers it contiguously,
/// otherwise gather into a fresh dense buffer. A view that addresses only a
/// prefix of the buffer takes the gather path, so the result is always
/// exactly elem_count elements.
fn ensure_contiguous(input: &CpuStorage, layout: &Layout) -> CpuStorage {
    if layout.is_contiguous() && layout.elem_count() == input.len() {
        return input.clone();
    }
    match input {
        CpuStorage::F32(v) => CpuStorage::F32(gather(v, layout)),
        CpuStorage::F64(v) => CpuStorage::F64(gather(v, layout)),
        CpuStorage::U8(v) => CpuStorage::U8(gather(v, layout)),
        CpuStorage::I64(v) => CpuStorage::I64(gather(v, layout)),
    }
}

/// Element-wise binary kernel over two layouts. When the shapes differ, both
/// operands are broadcast to their common shape first (stride-0 stretch), so
/// the output is dense in the broadcast shape.
fn binary_map<T: Copy, F: Fn(T, T) -> T>(
    lhs: &[T],
    lhs_layout: &Layout,
    rhs: &[T],
    rhs_layout: &Layout,
    f: F,
) -> Result<Vec<T>> {
    if lhs_layout.dims() == rhs_layout.dims() {
        return Ok(lhs_layout
            .strided_indices()
            .zip(rhs_layout.strided_indices())
            .map(|(i, j)| f(lhs[i], rhs[j]))
            .collect());
    }
    let out_shape = Shape::broadcast_shape(lhs_layout.shape(), rhs_layout.shape())?;
    let lhs_b = lhs_layout.broadcast_to(&out_shape)?;
    let rhs_b = rhs_layout.broadcast_to(&out_shape)?;
    Ok(lhs_b
        .strided_indices()
        .zip(rhs_b.strided_indices())
        .map(|(i, j)| f(lhs[i], rhs[j]))
        .collect())
}

/// Comparison kernel, same broadcast handling as binary_map but the output
/// is a u8 mask (1 = predicate holds).
fn cmp_map<T: Copy + PartialOrd>(
    op: CmpOp,
    lhs: &[T],
    lhs_layout: &Layout,
    rhs: &[T],
    rhs_layout: &Layout,
) -> Result<Vec<u8>> {
    let apply = |x: T, y: T| -> u8 {
        let hit = match op {
            CmpOp::Eq => x == y,
            CmpOp::Ne => x != y,
            CmpOp::Gt => x > y,
            CmpOp::Ge => x >= y,
            CmpOp::Lt => x < y,
            CmpOp::Le => x <= y,
        };
        hit as u8
    };
    if lhs_layout.dims() == rhs_layout.dims() {
        return Ok(lhs_layout
            .strided_indices()
            .zip(rhs_layout.strided_indices())
            .map(|(i, j)| apply(lhs[i], rhs[j]))
            .collect());
    }
    let out_shape = Shape::broadcast_shape(lhs_layout.shape(), rhs_layout.shape())?;
    let lhs_b = lhs_layout.broadcast_to(&out_shape)?;
    let rhs_b = rhs_layout.broadcast_to(&out_shape)?;
    Ok(lhs_b
        .strided_indices()
        .zip(rhs_b.strided_indices())
        .map(|(i, j)| apply(lhs[i], rhs[j]))
        .collect())
}

/// Float unary kernel body. Log is the natural logarithm.
fn unary_float<T: num_traits::Float>(op: UnaryOp, x: T) -> T {
    match op {
        UnaryOp::Neg => -x,
        UnaryOp::Abs => x.abs(),
        UnaryOp::Exp => x.exp(),
        UnaryOp::Log => x.ln(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Square => x * x,
        UnaryOp::Floor => x.floor(),
        UnaryOp::Ceil => x.ceil(),
        UnaryOp::Round => x.round(),
        UnaryOp::Trunc => x.trunc(),
    }
}

/// Reduce dense data shaped [outer, red, inner] along the middle axis,
/// accumulating in f64.
fn reduce_lanes<T: WithDType>(
    op: ReduceOp,
    data: &[T],
    outer: usize,
    red: usize,
    inner: usize,
) -> Vec<T> {
    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let lane = (0..red).map(|r| data[(o * red + r) * inner + i].to_f64());
            let acc = match op {
                ReduceOp::Sum => lane.sum::<f64>(),
                ReduceOp::Mean => lane.sum::<f64>() / red as f64,
                ReduceOp::Max => lane.fold(f64::NEG_INFINITY, f64::max),
                ReduceOp::Min => lane.fold(f64::INFINITY, f64::min),
            };
            out.push(T::from_f64(acc));
        }
    }
    out
}

/// Integer variant of reduce_lanes with an exact i64 accumulator.
/// Mean truncates toward zero.
fn reduce_lanes_i64(
    op: ReduceOp,
    data: &[i64],
    outer: usize,
    red: usize,
    inner: usize,
) -> Vec<i64> {
    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            let lane = (0..red).map(|r| data[(o * red + r) * inner + i]);
            let acc = match op {
                ReduceOp::Sum => lane.fold(0i64, i64::wrapping_add),
                ReduceOp::Mean => {
                    let s = lane.fold(0i64, i64::wrapping_add);
                    if red == 0 {
                        0
                    } else {
                        s / red as i64
                    }
                }
                ReduceOp::Max => lane.fold(i64::MIN, i64::max),
                ReduceOp::Min => lane.fold(i64::MAX, i64::min),
            };
            out.push(acc);
        }
    }
    out
}

/// Dense row-major matmul: out[b] = lhs[b] @ rhs[b] for each batch entry.
/// The inner loops follow the i-k-j order so the hot loop streams the output
/// row and one rhs row; output rows are computed in parallel.
fn matmul_batched<T>(a: &[T], b: &[T], batch: usize, m: usize, k: usize, n: usize) -> Vec<T>
where
    T: WithDType + std::ops::Mul<Output = T> + std::ops::AddAssign,
{
    let mut out = vec![T::zero(); batch * m * n];
    if out.is_empty() {
        return out;
    }
    out.par_chunks_mut(n).enumerate().for_each(|(row, out_row)| {
        let b_idx = row / m;
        let i = row % m;
        let a_row = &a[(b_idx * m + i) * k..][..k];
        let b_mat = &b[b_idx * k * n..][..k * n];
        for (p, &a_v) in a_row.iter().enumerate() {
            let b_row = &b_mat[p * n..][..n];
            for (o, &b_v) in out_row.iter_mut().zip(b_row) {
                *o += a_v * b_v;
            }
        }
    });
    out
}

/// Integer variant of matmul_batched with a wrapping multiply-accumulate,
/// matching the wrapping arithmetic of the integer binary ops.
fn matmul_batched_i64(a: &[i64], b: &[i64], batch: usize, m: usize, k: usize, n: usize) -> Vec<i64> {
    let mut out = vec![0i64; batch * m * n];
    if out.is_empty() {
        return out;
    }
    out.par_chunks_mut(n).enumerate().for_each(|(row, out_row)| {
        let b_idx = row / m;
        let i = row % m;
        let a_row = &a[(b_idx * m + i) * k..][..k];
        let b_mat = &b[b_idx * k * n..][..k * n];
        for (p, &a_v) in a_row.iter().enumerate() {
            let b_row = &b_mat[p * n..][..n];
            for (o, &b_v) in out_row.iter_mut().zip(b_row) {
                *o = o.wrapping_add(a_v.wrapping_mul(b_v));
            }
        }
    });
    out
}

/// Fill every element the layout addresses with a single value.
fn fill_slice<T: WithDType>(data: &mut [T], layout: &Layout, value: f64) {
    let v = T::from_f64(value);
    for i in layout.strided_indices() {
        data[i] = v;
    }
}

/// Strided element-by-element copy; both layouts describe the same logical
/// shape, either side may be non-contiguous.
fn copy_strided_slice<T: Copy>(dst: &mut [T], dst_layout: &Layout, src: &[T], src_layout: &Layout) {
    for (d, s) in dst_layout.strided_indices().zip(src_layout.strided_indices()) {
        dst[d] = src[s];
    }
}

/// Mask-select kernel: all three layouts share one logical shape.
fn select_by_mask<T: Copy>(
    mask: &[u8],
    mask_layout: &Layout,
    on_true: &[T],
    on_true_layout: &Layout,
    on_false: &[T],
    on_false_layout: &Layout,
) -> Vec<T> {
    mask_layout
        .strided_indices()
        .zip(
            on_true_layout
                .strided_indices()
                .zip(on_false_layout.strided_indices()),
        )
        .map(|(m, (t, f))| if mask[m] != 0 { on_true[t] } else { on_false[f] })
        .collect()
}

/// Gather rows along a dimension decomposed as [pre, src, post]. Negative
/// indices count from the end, NumPy style.
fn index_select_slice<T: Copy>(
    input: &[T],
    idx: &[i64],
    pre_dim: usize,
    src_dim: usize,
    post_dim: usize,
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(pre_dim * idx.len() * post_dim);
    for p in 0..pre_dim {
        for &raw in idx {
            let i = if raw < 0 { raw + src_dim as i64 } else { raw };
            if i < 0 || i as usize >= src_dim {
                return Err(Error::msg(format!(
                    "index_select: index {raw} out of bounds for dimension of size {src_dim}"
                )));
            }
            let base = (p * src_dim + i as usize) * post_dim;
            out.extend_from_slice(&input[base..base + post_dim]);
        }
    }
    Ok(out)
}

// Backend implementation

impl Backend for CpuBackend {
    type Device = CpuDevice;
    type Storage = CpuStorage;

    // ---- Creation ----

    fn zeros(shape: &Shape, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        let n = shape.elem_count();
        Ok(match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F64 => CpuStorage::F64(vec![0.0; n]),
            DType::U8 => CpuStorage::U8(vec![0; n]),
            DType::I64 => CpuStorage::I64(vec![0; n]),
        })
    }

    fn ones(shape: &Shape, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        Self::full(shape, 1.0, dtype, device)
    }

    fn full(shape: &Shape, val: f64, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        let n = shape.elem_count();
        Ok(match dtype {
            DType::F32 => CpuStorage::F32(vec![val as f32; n]),
            DType::F64 => CpuStorage::F64(vec![val; n]),
            DType::U8 => CpuStorage::U8(vec![val as u8; n]),
            DType::I64 => CpuStorage::I64(vec![val as i64; n]),
        })
    }

    fn from_f64_slice(data: &[f64], dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        Ok(match dtype {
            DType::F32 => CpuStorage::F32(data.iter().map(|&v| v as f32).collect()),
            DType::F64 => CpuStorage::F64(data.to_vec()),
            DType::U8 => CpuStorage::U8(data.iter().map(|&v| v as u8).collect()),
            DType::I64 => CpuStorage::I64(data.iter().map(|&v| v as i64).collect()),
        })
    }

    fn rand_uniform(shape: &Shape, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        use rand::Rng;
        let n = shape.elem_count();
        let mut rng = rand::thread_rng();
        match dtype {
            DType::F32 => Ok(CpuStorage::F32((0..n).map(|_| rng.gen::<f32>()).collect())),
            DType::F64 => Ok(CpuStorage::F64((0..n).map(|_| rng.gen::<f64>()).collect())),
            _ => Err(Error::msg(format!(
                "rand_uniform not supported for {:?}",
                dtype
            ))),
        }
    }

    fn rand_normal(shape: &Shape, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        use rand::Rng;
        use rand_distr::StandardNormal;
        let n = shape.elem_count();
        let mut rng = rand::thread_rng();
        match dtype {
            DType::F32 => Ok(CpuStorage::F32(
                (0..n).map(|_| rng.sample::<f32, _>(StandardNormal)).collect(),
            )),
            DType::F64 => Ok(CpuStorage::F64(
                (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect(),
            )),
            _ => Err(Error::msg(format!(
                "rand_normal not supported for {:?}",
                dtype
            ))),
        }
    }

    // ---- Binary ops ----

    fn binary_op(
        op: BinaryOp,
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        match (lhs, rhs) {
            (CpuStorage::F32(a), CpuStorage::F32(b)) => {
                let f: fn(f32, f32) -> f32 = match op {
                    BinaryOp::Add => |x, y| x + y,
                    BinaryOp::Sub => |x, y| x - y,
                    BinaryOp::Mul => |x, y| x * y,
                    BinaryOp::Div => |x, y| x / y,
                    BinaryOp::Maximum => f32::max,
                    BinaryOp::Minimum => f32::min,
                };
                Ok(CpuStorage::F32(binary_map(a, lhs_layout, b, rhs_layout, f)?))
            }
            (CpuStorage::F64(a), CpuStorage::F64(b)) => {
                let f: fn(f64, f64) -> f64 = match op {
                    BinaryOp::Add => |x, y| x + y,
                    BinaryOp::Sub => |x, y| x - y,
                    BinaryOp::Mul => |x, y| x * y,
                    BinaryOp::Div => |x, y| x / y,
                    BinaryOp::Maximum => f64::max,
                    BinaryOp::Minimum => f64::min,
                };
                Ok(CpuStorage::F64(binary_map(a, lhs_layout, b, rhs_layout, f)?))
            }
            (CpuStorage::U8(a), CpuStorage::U8(b)) => {
                // Wrapping arithmetic; division by zero yields 0.
                let f: fn(u8, u8) -> u8 = match op {
                    BinaryOp::Add => u8::wrapping_add,
                    BinaryOp::Sub => u8::wrapping_sub,
                    BinaryOp::Mul => u8::wrapping_mul,
                    BinaryOp::Div => |x, y| if y == 0 { 0 } else { x / y },
                    BinaryOp::Maximum => u8::max,
                    BinaryOp::Minimum => u8::min,
                };
                Ok(CpuStorage::U8(binary_map(a, lhs_layout, b, rhs_layout, f)?))
            }
            (CpuStorage::I64(a), CpuStorage::I64(b)) => {
                let f: fn(i64, i64) -> i64 = match op {
                    BinaryOp::Add => i64::wrapping_add,
                    BinaryOp::Sub => i64::wrapping_sub,
                    BinaryOp::Mul => i64::wrapping_mul,
                    BinaryOp::Div => |x, y| if y == 0 { 0 } else { x.wrapping_div(y) },
                    BinaryOp::Maximum => i64::max,
                    BinaryOp::Minimum => i64::min,
                };
                Ok(CpuStorage::I64(binary_map(a, lhs_layout, b, rhs_layout, f)?))
            }
            _ => Err(Error::msg("binary_op: dtype mismatch")),
        }
    }

    // ---- Unary ops ----

    fn unary_op(op: UnaryOp, input: &CpuStorage, layout: &Layout) -> Result<CpuStorage> {
        match input {
            CpuStorage::F32(v) => Ok(CpuStorage::F32(
                layout
                    .strided_indices()
                    .map(|i| unary_float(op, v[i]))
                    .collect(),
            )),
            CpuStorage::F64(v) => Ok(CpuStorage::F64(
                layout
                    .strided_indices()
                    .map(|i| unary_float(op, v[i]))
                    .collect(),
            )),
            CpuStorage::U8(v) => {
                let out: Vec<u8> = match op {
                    UnaryOp::Neg => layout
                        .strided_indices()
                        .map(|i| v[i].wrapping_neg())
                        .collect(),
                    UnaryOp::Square => layout
                        .strided_indices()
                        .map(|i| v[i].wrapping_mul(v[i]))
                        .collect(),
                    // Already integral: abs and the rounding family are identity.
                    UnaryOp::Abs
                    | UnaryOp::Floor
                    | UnaryOp::Ceil
                    | UnaryOp::Round
                    | UnaryOp::Trunc => gather(v, layout),
                    _ => {
                        return Err(Error::msg(format!(
                            "unary {op:?}: only float dtypes supported"
                        )))
                    }
                };
                Ok(CpuStorage::U8(out))
            }
            CpuStorage::I64(v) => {
                let out: Vec<i64> = match op {
                    UnaryOp::Neg => layout
                        .strided_indices()
                        .map(|i| v[i].wrapping_neg())
                        .collect(),
                    UnaryOp::Abs => layout
                        .strided_indices()
                        .map(|i| v[i].wrapping_abs())
                        .collect(),
                    UnaryOp::Square => layout
                        .strided_indices()
                        .map(|i| v[i].wrapping_mul(v[i]))
                        .collect(),
                    UnaryOp::Floor | UnaryOp::Ceil | UnaryOp::Round | UnaryOp::Trunc => {
                        gather(v, layout)
                    }
                    _ => {
                        return Err(Error::msg(format!(
                            "unary {op:?}: only float dtypes supported"
                        )))
                    }
                };
                Ok(CpuStorage::I64(out))
            }
        }
    }

    // ---- Reductions ----

    fn reduce_op(
        op: ReduceOp,
        input: &CpuStorage,
        layout: &Layout,
        dims: &[usize],
    ) -> Result<CpuStorage> {
        let input_c = ensure_contiguous(input, layout);
        let shape_dims = layout.dims();

        // Decompose the shape around the reduced dimension. Empty dims means
        // a single lane over all elements.
        let (outer, red, inner) = if dims.is_empty() {
            (1usize, layout.elem_count(), 1usize)
        } else if dims.len() == 1 {
            let dim = dims[0];
            let outer: usize = shape_dims[..dim].iter().product();
            let inner: usize = shape_dims[dim + 1..].iter().product();
            (outer, shape_dims[dim], inner)
        } else {
            return Err(Error::msg("reduce_op: multi-dim reduction not supported"));
        };

        match &input_c {
            CpuStorage::F32(v) => Ok(CpuStorage::F32(reduce_lanes(op, v, outer, red, inner))),
            CpuStorage::F64(v) => Ok(CpuStorage::F64(reduce_lanes(op, v, outer, red, inner))),
            CpuStorage::I64(v) => Ok(CpuStorage::I64(reduce_lanes_i64(op, v, outer, red, inner))),
            CpuStorage::U8(_) => Err(Error::msg("reduce_op: not supported for u8, cast first")),
        }
    }

    // ---- Matmul ----

    fn matmul(
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        let lhs_dims = lhs_layout.dims();
        let rhs_dims = rhs_layout.dims();
        let rank = lhs_dims.len();
        let m = lhs_dims[rank - 2];
        let k = lhs_dims[rank - 1];
        let n = rhs_dims[rhs_dims.len() - 1];
        // Batch shapes must agree dim-by-dim; equal element counts are not
        // enough, [2,3] and [3,2] batches would pair up by linear index.
        let batch_dims = &lhs_dims[..rank - 2];
        if batch_dims != &rhs_dims[..rhs_dims.len() - 2] {
            return Err(Error::msg(format!(
                "matmul: batch dims {:?} vs {:?} do not match",
                batch_dims,
                &rhs_dims[..rhs_dims.len() - 2]
            )));
        }
        let batch: usize = batch_dims.iter().product();

        let lhs_c = ensure_contiguous(lhs, lhs_layout);
        let rhs_c = ensure_contiguous(rhs, rhs_layout);

        match (&lhs_c, &rhs_c) {
            (CpuStorage::F32(a), CpuStorage::F32(b)) => {
                Ok(CpuStorage::F32(matmul_batched(a, b, batch, m, k, n)))
            }
            (CpuStorage::F64(a), CpuStorage::F64(b)) => {
                Ok(CpuStorage::F64(matmul_batched(a, b, batch, m, k, n)))
            }
            (CpuStorage::I64(a), CpuStorage::I64(b)) => {
                Ok(CpuStorage::I64(matmul_batched_i64(a, b, batch, m, k, n)))
            }
            _ => Err(Error::msg("matmul: unsupported dtype combination")),
        }
    }

    // ---- Data movement ----

    fn to_contiguous(input: &CpuStorage, layout: &Layout) -> Result<CpuStorage> {
        Ok(ensure_contiguous(input, layout))
    }

    fn to_f64_vec(input: &CpuStorage, layout: &Layout) -> Result<Vec<f64>> {
        Ok(match input {
            CpuStorage::F32(v) => layout.strided_indices().map(|i| v[i] as f64).collect(),
            CpuStorage::F64(v) => layout.strided_indices().map(|i| v[i]).collect(),
            CpuStorage::U8(v) => layout.strided_indices().map(|i| v[i] as f64).collect(),
            CpuStorage::I64(v) => layout.strided_indices().map(|i| v[i] as f64).collect(),
        })
    }

    // ---- In-place stores ----

    fn fill(dst: &mut CpuStorage, layout: &Layout, value: f64) -> Result<()> {
        match dst {
            CpuStorage::F32(v) => fill_slice(v, layout, value),
            CpuStorage::F64(v) => fill_slice(v, layout, value),
            CpuStorage::U8(v) => fill_slice(v, layout, value),
            CpuStorage::I64(v) => fill_slice(v, layout, value),
        }
        Ok(())
    }

    fn copy_strided(
        dst: &mut CpuStorage,
        dst_layout: &Layout,
        src: &CpuStorage,
        src_layout: &Layout,
    ) -> Result<()> {
        match (dst, src) {
            (CpuStorage::F32(d), CpuStorage::F32(s)) => {
                copy_strided_slice(d, dst_layout, s, src_layout)
            }
            (CpuStorage::F64(d), CpuStorage::F64(s)) => {
                copy_strided_slice(d, dst_layout, s, src_layout)
            }
            (CpuStorage::U8(d), CpuStorage::U8(s)) => {
                copy_strided_slice(d, dst_layout, s, src_layout)
            }
            (CpuStorage::I64(d), CpuStorage::I64(s)) => {
                copy_strided_slice(d, dst_layout, s, src_layout)
            }
            _ => return Err(Error::msg("copy_strided: dtype mismatch")),
        }
        Ok(())
    }

    fn read_value(storage: &CpuStorage, index: usize) -> Result<f64> {
        let v = match storage {
            CpuStorage::F32(v) => v.get(index).map(|&x| x as f64),
            CpuStorage::F64(v) => v.get(index).copied(),
            CpuStorage::U8(v) => v.get(index).map(|&x| x as f64),
            CpuStorage::I64(v) => v.get(index).map(|&x| x as f64),
        };
        v.ok_or_else(|| Error::msg(format!("read_value: index {index} out of range")))
    }

    fn write_value(storage: &mut CpuStorage, index: usize, value: f64) -> Result<()> {
        let ok = match storage {
            CpuStorage::F32(v) => v.get_mut(index).map(|x| *x = value as f32).is_some(),
            CpuStorage::F64(v) => v.get_mut(index).map(|x| *x = value).is_some(),
            CpuStorage::U8(v) => v.get_mut(index).map(|x| *x = value as u8).is_some(),
            CpuStorage::I64(v) => v.get_mut(index).map(|x| *x = value as i64).is_some(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::msg(format!(
                "write_value: index {index} out of range"
            )))
        }
    }

    // ---- Comparison ops ----

    fn cmp_op(
        op: CmpOp,
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        let out = match (lhs, rhs) {
            (CpuStorage::F32(a), CpuStorage::F32(b)) => cmp_map(op, a, lhs_layout, b, rhs_layout)?,
            (CpuStorage::F64(a), CpuStorage::F64(b)) => cmp_map(op, a, lhs_layout, b, rhs_layout)?,
            (CpuStorage::U8(a), CpuStorage::U8(b)) => cmp_map(op, a, lhs_layout, b, rhs_layout)?,
            (CpuStorage::I64(a), CpuStorage::I64(b)) => cmp_map(op, a, lhs_layout, b, rhs_layout)?,
            _ => return Err(Error::msg("cmp_op: dtype mismatch")),
        };
        Ok(CpuStorage::U8(out))
    }

    // ---- Affine ----

    fn affine(input: &CpuStorage, layout: &Layout, mul: f64, add: f64) -> Result<CpuStorage> {
        match input {
            CpuStorage::F32(v) => {
                let (m, a) = (mul as f32, add as f32);
                Ok(CpuStorage::F32(
                    layout.strided_indices().map(|i| v[i] * m + a).collect(),
                ))
            }
            CpuStorage::F64(v) => Ok(CpuStorage::F64(
                layout.strided_indices().map(|i| v[i] * mul + add).collect(),
            )),
            // Integer affine computes in f64 and truncates back.
            CpuStorage::U8(v) => Ok(CpuStorage::U8(
                layout
                    .strided_indices()
                    .map(|i| (v[i] as f64 * mul + add) as u8)
                    .collect(),
            )),
            CpuStorage::I64(v) => Ok(CpuStorage::I64(
                layout
                    .strided_indices()
                    .map(|i| (v[i] as f64 * mul + add) as i64)
                    .collect(),
            )),
        }
    }

    // ---- Powf ----

    fn powf(input: &CpuStorage, layout: &Layout, exponent: f64) -> Result<CpuStorage> {
        match input {
            CpuStorage::F32(v) => {
                let e = exponent as f32;
                Ok(CpuStorage::F32(
                    layout.strided_indices().map(|i| v[i].powf(e)).collect(),
                ))
            }
            CpuStorage::F64(v) => Ok(CpuStorage::F64(
                layout
                    .strided_indices()
                    .map(|i| v[i].powf(exponent))
                    .collect(),
            )),
            _ => Err(Error::msg("powf: only float dtypes supported")),
        }
    }

    // ---- Index select ----

    fn index_select(
        input: &CpuStorage,
        input_layout: &Layout,
        indices: &CpuStorage,
        indices_layout: &Layout,
        dim: usize,
    ) -> Result<CpuStorage> {
        let input_c = ensure_contiguous(input, input_layout);
        let indices_c = ensure_contiguous(indices, indices_layout);
        let idx: &[i64] = match &indices_c {
            CpuStorage::I64(v) => v,
            _ => return Err(Error::msg("index_select: indices must be an i64 array")),
        };

        let input_dims = input_layout.dims();
        let pre_dim: usize = input_dims[..dim].iter().product();
        let src_dim = input_dims[dim];
        let post_dim: usize = input_dims[dim + 1..].iter().product();

        match &input_c {
            CpuStorage::F32(v) => Ok(CpuStorage::F32(index_select_slice(
                v, idx, pre_dim, src_dim, post_dim,
            )?)),
            CpuStorage::F64(v) => Ok(CpuStorage::F64(index_select_slice(
                v, idx, pre_dim, src_dim, post_dim,
            )?)),
            CpuStorage::U8(v) => Ok(CpuStorage::U8(index_select_slice(
                v, idx, pre_dim, src_dim, post_dim,
            )?)),
            CpuStorage::I64(v) => Ok(CpuStorage::I64(index_select_slice(
                v, idx, pre_dim, src_dim, post_dim,
            )?)),
        }
    }

    // ---- Where / conditional select ----

    fn where_cond(
        mask: &CpuStorage,
        mask_layout: &Layout,
        on_true: &CpuStorage,
        on_true_layout: &Layout,
        on_false: &CpuStorage,
        on_false_layout: &Layout,
    ) -> Result<CpuStorage> {
        let mask = match mask {
            CpuStorage::U8(v) => v,
            _ => return Err(Error::msg("where_cond: mask must be a u8 array")),
        };
        match (on_true, on_false) {
            (CpuStorage::F32(t), CpuStorage::F32(f)) => Ok(CpuStorage::F32(select_by_mask(
                mask,
                mask_layout,
                t,
                on_true_layout,
                f,
                on_false_layout,
            ))),
            (CpuStorage::F64(t), CpuStorage::F64(f)) => Ok(CpuStorage::F64(select_by_mask(
                mask,
                mask_layout,
                t,
                on_true_layout,
                f,
                on_false_layout,
            ))),
            (CpuStorage::U8(t), CpuStorage::U8(f)) => Ok(CpuStorage::U8(select_by_mask(
                mask,
                mask_layout,
                t,
                on_true_layout,
                f,
                on_false_layout,
            ))),
            (CpuStorage::I64(t), CpuStorage::I64(f)) => Ok(CpuStorage::I64(select_by_mask(
                mask,
                mask_layout,
                t,
                on_true_layout,
                f,
                on_false_layout,
            ))),
            _ => Err(Error::msg("where_cond: branch dtypes must match")),
        }
    }
}
