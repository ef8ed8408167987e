//! # stoat-core
//!
//! Core array primitives and types for Stoat.
//!
//! This crate provides:
//! - [`Array`] — n-dimensional array with zero-copy views and aliasing stores
//! - [`Shape`] / [`Layout`] — shape, strides, and memory layout
//! - [`DType`] — data types (F32, F64, U8, I64)
//! - [`Backend`] trait — abstraction over compute backends
//! - [`FormatOptions`] — options for rendering array contents
// - DType: supported numeric types (f32, f64, u8, i64)
// - Shape: n-dimensional shape representation
// - Layout: shape + strides + offset for memory layout
// - Backend trait: abstraction for compute backends
// - Array: the fundamental n-dimensional array type

pub mod array;
pub mod backend;
pub mod display;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod shape;

pub use array::Array;
pub use backend::{Backend, BackendDevice};
pub use display::FormatOptions;
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use layout::Layout;
pub use shape::Shape;
