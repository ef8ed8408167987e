// A guided tour of stoat arrays: creation, broadcasting, views, linear algebra.
//
// Run with: `RUST_LOG=info cargo run -p demo-tour --release`

use stoat::prelude::*;

fn main() -> stoat::Result<()> {
    env_logger::init();

    // -- Why arrays: element-wise math without writing the loop -------------
    log::info!("phase: vec vs array");
    let n = 1_000_000;
    let plain: Vec<f64> = (0..n).map(|v| v as f64).collect();
    let vec_report = bench("vec double", 2, 5, || {
        plain.iter().map(|v| v * 2.0).collect::<Vec<f64>>()
    });
    let big = CpuArray::arange(n, DType::F64, &CpuDevice)?;
    let arr_report = bench("array double", 2, 5, || big.affine(2.0, 0.0));
    println!("{vec_report}");
    println!("{arr_report}");

    // -- Creation -----------------------------------------------------------
    log::info!("phase: creation");
    let data = CpuArray::randn((3, 4), DType::F64, &CpuDevice)?;
    println!("randn (3, 4):\n{data}");
    println!(
        "shape={:?} dtype={:?} ndim={}",
        data.dims(),
        data.dtype(),
        data.rank()
    );

    println!("data * 10:\n{}", data.affine(10.0, 0.0)?);
    println!("data + data:\n{}", data.add(&data)?);

    let zeros = CpuArray::zeros((2, 3), DType::F64, &CpuDevice)?;
    println!("zeros (2, 3):\n{zeros}");
    let table = CpuArray::arange(15, DType::I64, &CpuDevice)?.reshape((3, 5))?;
    println!("arange(15) as (3, 5):\n{table}");
    let filled = CpuArray::full((2, 2), 2.4, DType::F64, &CpuDevice)?;
    println!("full (2, 2) of 2.4:\n{filled}");
    println!("zeros_like(filled):\n{}", CpuArray::zeros_like(&filled)?);
    println!("eye(3):\n{}", CpuArray::eye(3, DType::F64, &CpuDevice)?);
    println!(
        "linspace(0, 1, 5): {}",
        CpuArray::linspace(0.0, 1.0, 5, DType::F64, &CpuDevice)?
    );

    // -- Element-wise math --------------------------------------------------
    log::info!("phase: ufuncs");
    let arr = CpuArray::from_f64_slice(&[1.0, 4.0, 9.0, 16.0], (4,), DType::F64, &CpuDevice)?;
    println!("arr          = {arr}");
    println!("arr * arr    = {}", arr.mul(&arr)?);
    println!("arr - arr    = {}", arr.sub(&arr)?);
    println!("1 / arr      = {}", arr.reciprocal()?);
    println!("arr ** 0.5   = {}", arr.powf(0.5)?);
    println!("exp(arr)     = {}", arr.exp()?);

    // -- Broadcasting -------------------------------------------------------
    log::info!("phase: broadcasting");
    let m = CpuArray::arange(6, DType::F64, &CpuDevice)?.reshape((2, 3))?;
    let row = CpuArray::from_f64_slice(&[10.0, 20.0, 30.0], (3,), DType::F64, &CpuDevice)?;
    println!("m:\n{m}");
    println!("m + row:\n{}", m.add(&row)?);

    // -- Views and aliasing -------------------------------------------------
    log::info!("phase: views and aliasing");
    let base = CpuArray::arange(10, DType::I64, &CpuDevice)?;
    let window = base.slice(0, 3..5)?;
    window.fill(0.0)?;
    println!("after slice(0, 3..5).fill(0): {base}");

    let detached = base.copy()?;
    detached.fill(-1.0)?;
    println!("filling a copy leaves the base untouched: {base}");

    println!("m transposed (zero-copy):\n{}", m.t()?);

    // -- Reductions ---------------------------------------------------------
    log::info!("phase: reductions");
    println!("m.sum_all()    = {}", m.sum_all()?);
    println!("m.sum(0)       = {}", m.sum(0, false)?);
    println!("m.mean(1)      = {}", m.mean(1, false)?);
    println!("m.max_all()    = {}", m.max_all()?);

    // -- Matrix multiplication and linear algebra ---------------------------
    log::info!("phase: linear algebra");
    let a = CpuArray::from_f64_slice(
        &[4.0, 2.0, 1.0, 2.0, 5.0, 3.0, 1.0, 3.0, 6.0],
        (3, 3),
        DType::F64,
        &CpuDevice,
    )?;
    let b = CpuArray::from_f64_slice(&[1.0, 2.0, 3.0], (3,), DType::F64, &CpuDevice)?;
    println!("a @ a:\n{}", a.matmul(&a)?);
    println!("det(a) = {:.4}", det(&a)?);
    let a_inv = inv(&a)?;
    println!("inv(a):\n{a_inv}");
    println!("a @ inv(a):\n{}", a.matmul(&a_inv)?);
    let (q, r) = qr(&a)?;
    println!("qr(a) — q:\n{q}");
    println!("qr(a) — r:\n{r}");
    println!("solve(a, b) = {}", solve(&a, &b)?);

    let (product, elapsed) = time(|| a.matmul(&a));
    product?;
    log::info!("one 3x3 matmul took {elapsed:?}");

    Ok(())
}
