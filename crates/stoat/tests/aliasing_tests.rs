// Aliasing tests — writes through views are visible through every view of the same buffer

use stoat::prelude::*;

fn vector(data: &[f64]) -> CpuArray {
    CpuArray::from_f64_slice(data, data.len(), DType::F64, &CpuDevice).unwrap()
}

fn matrix(data: &[f64], rows: usize, cols: usize) -> CpuArray {
    CpuArray::from_f64_slice(data, (rows, cols), DType::F64, &CpuDevice).unwrap()
}

// Slices

#[test]
fn test_slice_fill_writes_through() {
    let b = CpuArray::arange(10, DType::I64, &CpuDevice).unwrap();
    let s = b.slice(0, 3..5).unwrap();
    s.fill(0.0).unwrap();
    assert_eq!(
        b.to_f64_vec().unwrap(),
        vec![0.0, 1.0, 2.0, 0.0, 0.0, 5.0, 6.0, 7.0, 8.0, 9.0]
    );
}

#[test]
fn test_slice_set_writes_through() {
    let b = vector(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let s = b.slice(0, 2..5).unwrap();
    s.set(&[1], 99.0).unwrap();
    assert_eq!(b.get(&[3]).unwrap(), 99.0);
    // and the other direction: writes to the base show up in the view
    b.set(&[2], 7.0).unwrap();
    assert_eq!(s.get(&[0]).unwrap(), 7.0);
}

#[test]
fn test_slice_fill_touches_nothing_else() {
    let b = vector(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    b.slice(0, 1..3).unwrap().fill(-1.0).unwrap();
    assert_eq!(
        b.to_f64_vec().unwrap(),
        vec![1.0, -1.0, -1.0, 1.0, 1.0, 1.0]
    );
}

#[test]
fn test_view_of_view() {
    let b = vector(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    let s1 = b.slice(0, 2..8).unwrap();
    let s2 = s1.slice(0, 1..3).unwrap();
    assert!(s2.shares_storage(&b));
    s2.fill(-1.0).unwrap();
    assert_eq!(
        b.to_f64_vec().unwrap(),
        vec![0.0, 1.0, 2.0, -1.0, -1.0, 5.0, 6.0, 7.0, 8.0, 9.0]
    );
}

// Transpose and select views

#[test]
fn test_transposed_view_aliases() {
    let m = matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
    let mt = m.t().unwrap();
    assert!(mt.shares_storage(&m));
    mt.set(&[2, 1], 42.0).unwrap();
    assert_eq!(m.get(&[1, 2]).unwrap(), 42.0);
}

#[test]
fn test_select_row_aliases() {
    let m = matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
    let row = m.select(0, 1).unwrap();
    row.fill(0.0).unwrap();
    assert_eq!(
        m.to_f64_vec().unwrap(),
        vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]
    );
}

#[test]
fn test_column_slice_strided_fill() {
    let m = matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
    let col = m.slice(1, 0..1).unwrap();
    col.fill(9.0).unwrap();
    assert_eq!(
        m.to_f64_vec().unwrap(),
        vec![9.0, 2.0, 3.0, 9.0, 5.0, 6.0]
    );
}

#[test]
fn test_reshape_of_contiguous_aliases() {
    let b = vector(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let m = b.reshape((2, 3)).unwrap();
    assert!(m.shares_storage(&b));
    m.set(&[1, 0], 30.0).unwrap();
    assert_eq!(b.get(&[3]).unwrap(), 30.0);
}

#[test]
fn test_broadcast_view_aliases() {
    let v = vector(&[1.0, 2.0, 3.0]);
    let wide = v.unsqueeze(0).unwrap().broadcast_to((4, 3)).unwrap();
    assert!(wide.shares_storage(&v));
    assert_eq!(wide.elem_count(), 12);
}

// Detaching

#[test]
fn test_copy_detaches() {
    let b = vector(&[1.0, 2.0, 3.0, 4.0]);
    let c = b.copy().unwrap();
    assert!(!c.shares_storage(&b));
    b.fill(0.0).unwrap();
    assert_eq!(c.to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_contiguous_of_view_detaches() {
    let m = matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
    let mt = m.t().unwrap();
    let c = mt.contiguous().unwrap();
    assert!(!c.shares_storage(&m));
    c.fill(0.0).unwrap();
    assert_eq!(
        m.to_f64_vec().unwrap(),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
    );
}

// Bulk stores

#[test]
fn test_assign_broadcast_store() {
    let dst = CpuArray::zeros((3, 4), DType::F64, &CpuDevice).unwrap();
    let row = vector(&[1.0, 2.0, 3.0, 4.0]);
    dst.assign(&row).unwrap();
    assert_eq!(
        dst.to_f64_vec().unwrap(),
        vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0]
    );
}

#[test]
fn test_assign_into_slice() {
    let b = vector(&[0.0, 0.0, 0.0, 0.0, 0.0]);
    let s = b.slice(0, 1..4).unwrap();
    s.assign(&vector(&[7.0, 8.0, 9.0])).unwrap();
    assert_eq!(
        b.to_f64_vec().unwrap(),
        vec![0.0, 7.0, 8.0, 9.0, 0.0]
    );
}

#[test]
fn test_assign_overlapping_slices() {
    // src and dst alias the same buffer; the store must read src's values
    // as they were before any element of dst is written
    let b = vector(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let left = b.slice(0, 0..3).unwrap();
    let right = b.slice(0, 2..5).unwrap();
    assert!(left.shares_storage(&right));
    right.assign(&left).unwrap();
    assert_eq!(
        b.to_f64_vec().unwrap(),
        vec![0.0, 1.0, 0.0, 1.0, 2.0, 5.0]
    );
}

#[test]
fn test_assign_dtype_mismatch() {
    let dst = CpuArray::zeros((3,), DType::F64, &CpuDevice).unwrap();
    let src = CpuArray::zeros((3,), DType::F32, &CpuDevice).unwrap();
    assert!(dst.assign(&src).is_err());
}

#[test]
fn test_assign_into_transposed_view() {
    let m = CpuArray::zeros((2, 3), DType::F64, &CpuDevice).unwrap();
    let mt = m.t().unwrap();
    mt.assign(&matrix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2)).unwrap();
    // [[1,2],[3,4],[5,6]] written through the transpose lands as [[1,3,5],[2,4,6]]
    assert_eq!(
        m.to_f64_vec().unwrap(),
        vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]
    );
}

// Ops on views produce detached results

#[test]
fn test_arithmetic_result_is_detached() {
    let b = vector(&[1.0, 2.0, 3.0]);
    let c = b.add(&b).unwrap();
    assert!(!c.shares_storage(&b));
    b.fill(0.0).unwrap();
    assert_eq!(c.to_f64_vec().unwrap(), vec![2.0, 4.0, 6.0]);
}
