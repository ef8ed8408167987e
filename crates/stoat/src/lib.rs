//! # Stoat
//!
//! An n-dimensional array library with zero-copy views and broadcasting.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use stoat::prelude::*;
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `stoat-core` | Array, Shape, DType, Layout, Backend trait, display |
//! | `stoat-cpu` | CPU backend with rayon-parallel matmul |
//!
//! ## Modules
//!
//! - [`linalg`] — matrix inverse, determinant, QR decomposition, linear solve
//! - [`timing`] — expression timing, stopwatch, repeat-benchmark reports

/// Re-export core types.
pub use stoat_core::{
    backend::{Backend, BackendDevice, BackendStorage, BinaryOp, CmpOp, ReduceOp, UnaryOp},
    Array, DType, Error, FormatOptions, Layout, Result, Shape, WithDType,
};

/// Re-export CPU backend.
pub use stoat_cpu::{CpuArray, CpuBackend, CpuDevice, CpuStorage};

/// Dense linear algebra — inverse, determinant, QR, solve.
pub mod linalg;

/// Timing & benchmarking — expression timing, stopwatch, repeat reports.
pub mod timing;

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::linalg::{det, inv, qr, solve};
    pub use crate::timing::{bench, time, BenchOptions, BenchReport, Stopwatch};
    pub use crate::{
        Array, Backend, CpuArray, CpuBackend, CpuDevice, DType, FormatOptions, Shape,
    };
}
