// =============================================================================
// Linear Algebra — matrix inverse, determinant, QR decomposition, linear solve
// =============================================================================
//
// All routines pull the matrix to host memory as f64, run a dense textbook
// algorithm there, and rebuild an array on the input's device. Float inputs
// keep their dtype; integer inputs come back as F64.

use stoat_core::{Array, Backend, DType, Error, Result};

/// Pivots smaller than this are treated as zero.
const SINGULAR_EPS: f64 = 1e-12;

fn output_dtype(dtype: DType) -> DType {
    if dtype.is_float() {
        dtype
    } else {
        DType::F64
    }
}

/// Check that `a` is a square matrix and return its side length.
fn square_side<B: Backend>(a: &Array<B>) -> Result<usize> {
    let dims = a.dims();
    if dims.len() != 2 {
        return Err(Error::msg(format!(
            "linalg: expected a matrix, got rank {}",
            dims.len()
        )));
    }
    let (rows, cols) = (dims[0], dims[1]);
    if rows != cols {
        return Err(Error::NotSquare { rows, cols });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// inv — Gauss–Jordan elimination with partial pivoting
// ---------------------------------------------------------------------------

/// Invert a square matrix.
///
/// Returns [`Error::NotSquare`] for non-square input and
/// [`Error::SingularMatrix`] when elimination hits a zero pivot.
///
/// # Example
/// ```
/// use stoat::linalg::inv;
/// use stoat::{CpuArray, CpuDevice, DType};
///
/// let m = CpuArray::from_f64_slice(&[4.0, 7.0, 2.0, 6.0], (2, 2), DType::F64, &CpuDevice).unwrap();
/// let m_inv = inv(&m).unwrap();
/// let prod = m.matmul(&m_inv).unwrap().to_f64_vec().unwrap();
/// assert!((prod[0] - 1.0).abs() < 1e-9);
/// assert!(prod[1].abs() < 1e-9);
/// ```
pub fn inv<B: Backend>(a: &Array<B>) -> Result<Array<B>> {
    let n = square_side(a)?;
    let mut m = a.to_f64_vec()?;
    // inverse accumulates in an identity matrix run through the same row ops
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        out[i * n + i] = 1.0;
    }

    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if m[row * n + col].abs() > m[pivot * n + col].abs() {
                pivot = row;
            }
        }
        if m[pivot * n + col].abs() < SINGULAR_EPS {
            return Err(Error::SingularMatrix);
        }
        if pivot != col {
            for j in 0..n {
                m.swap(col * n + j, pivot * n + j);
                out.swap(col * n + j, pivot * n + j);
            }
        }
        let inv_pivot = 1.0 / m[col * n + col];
        for j in 0..n {
            m[col * n + j] *= inv_pivot;
            out[col * n + j] *= inv_pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[row * n + col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                m[row * n + j] -= factor * m[col * n + j];
                out[row * n + j] -= factor * out[col * n + j];
            }
        }
    }

    Array::from_f64_slice(&out, (n, n), output_dtype(a.dtype()), a.device())
}

// ---------------------------------------------------------------------------
// det — LU elimination, product of pivots with row-swap sign
// ---------------------------------------------------------------------------

/// Determinant of a square matrix.
///
/// A structurally singular matrix returns `0.0`; only non-square input errors.
pub fn det<B: Backend>(a: &Array<B>) -> Result<f64> {
    let n = square_side(a)?;
    let mut m = a.to_f64_vec()?;
    let mut det = 1.0;

    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if m[row * n + col].abs() > m[pivot * n + col].abs() {
                pivot = row;
            }
        }
        if m[pivot * n + col] == 0.0 {
            return Ok(0.0);
        }
        if pivot != col {
            for j in 0..n {
                m.swap(col * n + j, pivot * n + j);
            }
            det = -det;
        }
        let pivot_val = m[col * n + col];
        det *= pivot_val;
        for row in col + 1..n {
            let factor = m[row * n + col] / pivot_val;
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                m[row * n + j] -= factor * m[col * n + j];
            }
        }
    }

    Ok(det)
}

// ---------------------------------------------------------------------------
// qr — Householder reflections, thin factors
// ---------------------------------------------------------------------------

/// QR decomposition of an [m, n] matrix via Householder reflections.
///
/// Returns the thin factors: `q` is [m, k] with orthonormal columns and `r` is
/// [k, n] upper-triangular, where `k = min(m, n)`, and `q.matmul(&r)`
/// reconstructs the input.
///
/// # Example
/// ```
/// use stoat::linalg::qr;
/// use stoat::{CpuArray, CpuDevice, DType};
///
/// let m = CpuArray::from_f64_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (3, 2), DType::F64, &CpuDevice).unwrap();
/// let (q, r) = qr(&m).unwrap();
/// assert_eq!(q.shape().dims(), &[3, 2]);
/// assert_eq!(r.shape().dims(), &[2, 2]);
/// ```
pub fn qr<B: Backend>(a: &Array<B>) -> Result<(Array<B>, Array<B>)> {
    let dims = a.dims();
    if dims.len() != 2 {
        return Err(Error::msg(format!(
            "qr: expected a matrix, got rank {}",
            dims.len()
        )));
    }
    let (m, n) = (dims[0], dims[1]);
    let k = m.min(n);
    let mut r = a.to_f64_vec()?;
    let mut q = vec![0.0; m * m];
    for i in 0..m {
        q[i * m + i] = 1.0;
    }

    let mut v = vec![0.0; m];
    for j in 0..k {
        // Householder vector zeroing column j below the diagonal
        let mut norm_sq = 0.0;
        for i in j..m {
            norm_sq += r[i * n + j] * r[i * n + j];
        }
        let norm = norm_sq.sqrt();
        if norm == 0.0 {
            continue;
        }
        // sign chosen to avoid cancellation in v[j]
        let alpha = if r[j * n + j] > 0.0 { -norm } else { norm };
        let mut v_norm_sq = 0.0;
        for i in j..m {
            v[i] = r[i * n + j];
            if i == j {
                v[i] -= alpha;
            }
            v_norm_sq += v[i] * v[i];
        }
        if v_norm_sq < SINGULAR_EPS * SINGULAR_EPS {
            continue;
        }

        // R ← (I − 2vvᵀ/vᵀv) R, touching only columns j..
        for col in j..n {
            let mut dot = 0.0;
            for i in j..m {
                dot += v[i] * r[i * n + col];
            }
            let scale = 2.0 * dot / v_norm_sq;
            for i in j..m {
                r[i * n + col] -= scale * v[i];
            }
        }
        // Q ← Q (I − 2vvᵀ/vᵀv)
        for row in 0..m {
            let mut dot = 0.0;
            for i in j..m {
                dot += q[row * m + i] * v[i];
            }
            let scale = 2.0 * dot / v_norm_sq;
            for i in j..m {
                q[row * m + i] -= scale * v[i];
            }
        }
    }

    let mut q_thin = vec![0.0; m * k];
    for row in 0..m {
        q_thin[row * k..row * k + k].copy_from_slice(&q[row * m..row * m + k]);
    }
    // copy only at-or-above the diagonal so sub-diagonal entries are exact zeros
    let mut r_thin = vec![0.0; k * n];
    for row in 0..k {
        for col in row..n {
            r_thin[row * n + col] = r[row * n + col];
        }
    }

    let dtype = output_dtype(a.dtype());
    let q_arr = Array::from_f64_slice(&q_thin, (m, k), dtype, a.device())?;
    let r_arr = Array::from_f64_slice(&r_thin, (k, n), dtype, a.device())?;
    Ok((q_arr, r_arr))
}

// ---------------------------------------------------------------------------
// solve — LU with partial pivoting + back substitution
// ---------------------------------------------------------------------------

/// Solve the linear system `a · x = b` for `x`.
///
/// `a` must be square [n, n]; `b` is a vector [n] or a matrix [n, m] of
/// stacked right-hand sides, and `x` comes back with `b`'s shape.
pub fn solve<B: Backend>(a: &Array<B>, b: &Array<B>) -> Result<Array<B>> {
    let n = square_side(a)?;
    let b_dims = b.dims();
    let (rhs_rows, nrhs) = match b_dims.len() {
        1 => (b_dims[0], 1),
        2 => (b_dims[0], b_dims[1]),
        rank => {
            return Err(Error::msg(format!(
                "solve: rhs must be rank 1 or 2, got rank {rank}"
            )))
        }
    };
    if rhs_rows != n {
        return Err(Error::msg(format!(
            "solve: lhs is {n}x{n} but rhs has {rhs_rows} rows"
        )));
    }

    let mut m = a.to_f64_vec()?;
    let mut x = b.to_f64_vec()?;

    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if m[row * n + col].abs() > m[pivot * n + col].abs() {
                pivot = row;
            }
        }
        if m[pivot * n + col].abs() < SINGULAR_EPS {
            return Err(Error::SingularMatrix);
        }
        if pivot != col {
            for j in 0..n {
                m.swap(col * n + j, pivot * n + j);
            }
            for j in 0..nrhs {
                x.swap(col * nrhs + j, pivot * nrhs + j);
            }
        }
        let pivot_val = m[col * n + col];
        for row in col + 1..n {
            let factor = m[row * n + col] / pivot_val;
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                m[row * n + j] -= factor * m[col * n + j];
            }
            for j in 0..nrhs {
                x[row * nrhs + j] -= factor * x[col * nrhs + j];
            }
        }
    }

    for col in (0..n).rev() {
        let diag = m[col * n + col];
        for j in 0..nrhs {
            let mut sum = x[col * nrhs + j];
            for k in col + 1..n {
                sum -= m[col * n + k] * x[k * nrhs + j];
            }
            x[col * nrhs + j] = sum / diag;
        }
    }

    let dtype = output_dtype(a.dtype());
    if b_dims.len() == 1 {
        Array::from_f64_slice(&x, (n,), dtype, a.device())
    } else {
        Array::from_f64_slice(&x, (n, nrhs), dtype, a.device())
    }
}
