// Linear algebra tests — inverse, determinant, QR decomposition, solve

use stoat::prelude::*;
use stoat::Error;

fn matrix(data: &[f64], rows: usize, cols: usize) -> CpuArray {
    CpuArray::from_f64_slice(data, (rows, cols), DType::F64, &CpuDevice).unwrap()
}

fn assert_approx_vec(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            (a - e).abs() < tol,
            "index {i}: {a} != {e} (tol={tol})"
        );
    }
}

fn assert_approx_identity(data: &[f64], n: usize, tol: f64) {
    for i in 0..n {
        for j in 0..n {
            let expected = if i == j { 1.0 } else { 0.0 };
            let got = data[i * n + j];
            assert!(
                (got - expected).abs() < tol,
                "({i},{j}): {got} != {expected}"
            );
        }
    }
}

// Inverse

#[test]
fn test_inv_known_2x2() {
    let m = matrix(&[4.0, 7.0, 2.0, 6.0], 2, 2);
    let m_inv = inv(&m).unwrap();
    assert_approx_vec(
        &m_inv.to_f64_vec().unwrap(),
        &[0.6, -0.7, -0.2, 0.4],
        1e-12,
    );
}

#[test]
fn test_inv_product_is_identity() {
    let m = matrix(&[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0], 3, 3);
    let p = m.matmul(&inv(&m).unwrap()).unwrap();
    assert_approx_identity(&p.to_f64_vec().unwrap(), 3, 1e-9);
}

#[test]
fn test_inv_of_transposed_view() {
    let m = matrix(&[2.0, 1.0, 1.0, 1.0, 3.0, 2.0, 1.0, 0.0, 0.0], 3, 3);
    let mt = m.t().unwrap();
    let p = mt.matmul(&inv(&mt).unwrap()).unwrap();
    assert_approx_identity(&p.to_f64_vec().unwrap(), 3, 1e-9);
}

#[test]
fn test_inv_f32_keeps_dtype() {
    let m = CpuArray::from_f64_slice(&[4.0, 7.0, 2.0, 6.0], (2, 2), DType::F32, &CpuDevice)
        .unwrap();
    let m_inv = inv(&m).unwrap();
    assert_eq!(m_inv.dtype(), DType::F32);
}

#[test]
fn test_inv_int_promotes_to_f64() {
    let m = CpuArray::from_f64_slice(&[1.0, 1.0, 0.0, 1.0], (2, 2), DType::I64, &CpuDevice)
        .unwrap();
    let m_inv = inv(&m).unwrap();
    assert_eq!(m_inv.dtype(), DType::F64);
    assert_approx_vec(&m_inv.to_f64_vec().unwrap(), &[1.0, -1.0, 0.0, 1.0], 1e-12);
}

#[test]
fn test_inv_singular() {
    let m = matrix(&[1.0, 2.0, 2.0, 4.0], 2, 2);
    let err = inv(&m).unwrap_err();
    assert!(matches!(err, Error::SingularMatrix));
}

#[test]
fn test_inv_not_square() {
    let m = matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
    let err = inv(&m).unwrap_err();
    assert!(matches!(err, Error::NotSquare { rows: 2, cols: 3 }));
}

// Determinant

#[test]
fn test_det_2x2() {
    let m = matrix(&[1.0, 2.0, 3.0, 4.0], 2, 2);
    assert!((det(&m).unwrap() - (-2.0)).abs() < 1e-12);
}

#[test]
fn test_det_identity() {
    let eye = CpuArray::eye(4, DType::F64, &CpuDevice).unwrap();
    assert!((det(&eye).unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn test_det_row_swap_flips_sign() {
    let m = matrix(&[1.0, 2.0, 3.0, 4.0], 2, 2);
    let swapped = matrix(&[3.0, 4.0, 1.0, 2.0], 2, 2);
    let d = det(&m).unwrap();
    let d_swapped = det(&swapped).unwrap();
    assert!((d + d_swapped).abs() < 1e-12, "{d} vs {d_swapped}");
}

#[test]
fn test_det_triangular_is_diagonal_product() {
    let m = matrix(&[2.0, 1.0, 3.0, 0.0, 5.0, 1.0, 0.0, 0.0, 4.0], 3, 3);
    assert!((det(&m).unwrap() - 40.0).abs() < 1e-9);
}

#[test]
fn test_det_singular_is_zero() {
    let m = matrix(&[1.0, 2.0, 2.0, 4.0], 2, 2);
    assert_eq!(det(&m).unwrap(), 0.0);
}

#[test]
fn test_det_not_square() {
    let m = matrix(&[1.0, 2.0, 3.0], 1, 3);
    assert!(matches!(det(&m).unwrap_err(), Error::NotSquare { .. }));
}

// QR decomposition

#[test]
fn test_qr_reconstructs_tall() {
    let m = matrix(
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0, 2.0, 1.0, 0.0],
        4,
        3,
    );
    let (q, r) = qr(&m).unwrap();
    assert_eq!(q.shape().dims(), &[4, 3]);
    assert_eq!(r.shape().dims(), &[3, 3]);
    let back = q.matmul(&r).unwrap();
    assert_approx_vec(
        &back.to_f64_vec().unwrap(),
        &m.to_f64_vec().unwrap(),
        1e-9,
    );
}

#[test]
fn test_qr_q_has_orthonormal_columns() {
    let m = matrix(
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0, 2.0, 1.0, 0.0],
        4,
        3,
    );
    let (q, _) = qr(&m).unwrap();
    let qtq = q.t().unwrap().matmul(&q).unwrap();
    assert_approx_identity(&qtq.to_f64_vec().unwrap(), 3, 1e-9);
}

#[test]
fn test_qr_r_is_upper_triangular() {
    let m = matrix(&[1.0, 2.0, 4.0, 5.0, 7.0, 9.0], 3, 2);
    let (_, r) = qr(&m).unwrap();
    let data = r.to_f64_vec().unwrap();
    // entries below the diagonal are exact zeros
    assert_eq!(data[2], 0.0);
}

#[test]
fn test_qr_square() {
    let m = matrix(&[2.0, 1.0, 1.0, 1.0, 3.0, 2.0, 1.0, 0.0, 0.0], 3, 3);
    let (q, r) = qr(&m).unwrap();
    assert_eq!(q.shape().dims(), &[3, 3]);
    assert_eq!(r.shape().dims(), &[3, 3]);
    let back = q.matmul(&r).unwrap();
    assert_approx_vec(
        &back.to_f64_vec().unwrap(),
        &m.to_f64_vec().unwrap(),
        1e-9,
    );
}

#[test]
fn test_qr_wide() {
    let m = matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 9.0], 2, 4);
    let (q, r) = qr(&m).unwrap();
    assert_eq!(q.shape().dims(), &[2, 2]);
    assert_eq!(r.shape().dims(), &[2, 4]);
    let back = q.matmul(&r).unwrap();
    assert_approx_vec(
        &back.to_f64_vec().unwrap(),
        &m.to_f64_vec().unwrap(),
        1e-9,
    );
}

#[test]
fn test_qr_not_a_matrix() {
    let v = CpuArray::arange(4, DType::F64, &CpuDevice).unwrap();
    assert!(qr(&v).is_err());
}

// Solve

#[test]
fn test_solve_vector() {
    // 3x + y = 9, x + 2y = 8 → x = 2, y = 3
    let a = matrix(&[3.0, 1.0, 1.0, 2.0], 2, 2);
    let b = CpuArray::from_f64_slice(&[9.0, 8.0], (2,), DType::F64, &CpuDevice).unwrap();
    let x = solve(&a, &b).unwrap();
    assert_eq!(x.shape().dims(), &[2]);
    assert_approx_vec(&x.to_f64_vec().unwrap(), &[2.0, 3.0], 1e-9);
}

#[test]
fn test_solve_round_trip() {
    let a = matrix(&[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0], 3, 3);
    let b = CpuArray::from_f64_slice(&[1.0, -2.0, 0.5], (3,), DType::F64, &CpuDevice).unwrap();
    let x = solve(&a, &b).unwrap();
    let back = a.dot(&x).unwrap();
    assert_approx_vec(&back.to_f64_vec().unwrap(), &[1.0, -2.0, 0.5], 1e-9);
}

#[test]
fn test_solve_matrix_rhs() {
    let a = matrix(&[3.0, 1.0, 1.0, 2.0], 2, 2);
    let b = matrix(&[9.0, 1.0, 8.0, 0.0], 2, 2);
    let x = solve(&a, &b).unwrap();
    assert_eq!(x.shape().dims(), &[2, 2]);
    let back = a.matmul(&x).unwrap();
    assert_approx_vec(&back.to_f64_vec().unwrap(), &b.to_f64_vec().unwrap(), 1e-9);
}

#[test]
fn test_solve_against_inverse() {
    let a = matrix(&[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0], 3, 3);
    let b = CpuArray::from_f64_slice(&[1.0, 2.0, 3.0], (3,), DType::F64, &CpuDevice).unwrap();
    let x = solve(&a, &b).unwrap();
    let x_via_inv = inv(&a).unwrap().dot(&b).unwrap();
    assert_approx_vec(
        &x.to_f64_vec().unwrap(),
        &x_via_inv.to_f64_vec().unwrap(),
        1e-9,
    );
}

#[test]
fn test_solve_singular() {
    let a = matrix(&[1.0, 2.0, 2.0, 4.0], 2, 2);
    let b = CpuArray::from_f64_slice(&[1.0, 2.0], (2,), DType::F64, &CpuDevice).unwrap();
    assert!(matches!(solve(&a, &b).unwrap_err(), Error::SingularMatrix));
}

#[test]
fn test_solve_rhs_row_mismatch() {
    let a = matrix(&[3.0, 1.0, 1.0, 2.0], 2, 2);
    let b = CpuArray::from_f64_slice(&[1.0, 2.0, 3.0], (3,), DType::F64, &CpuDevice).unwrap();
    assert!(solve(&a, &b).is_err());
}
