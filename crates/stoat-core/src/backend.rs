use crate::dtype::DType;
use crate::error::Result;
use crate::layout::Layout;
use crate::shape::Shape;
use std::fmt;

// Backend — Abstraction over compute devices
//
// The Backend trait is the central abstraction that makes Stoat extensible.
// Each backend (CPU today, potentially others) implements this trait,
// providing its own storage type and operation implementations.
//
// WHY A TRAIT AND NOT AN ENUM?
//
// Using a trait (vs. an enum like `Device::Cpu | Device::Other`) means:
// - New backends can be added as separate crates without modifying stoat-core
// - Each backend can have different associated types for its storage
// - The compiler can monomorphize for performance
//
// The tradeoff is that Array becomes generic: Array<B: Backend>.

/// Identifies a compute device (e.g., "cpu").
pub trait BackendDevice: Clone + fmt::Debug + Send + Sync + 'static {
    /// A human-readable name for this device.
    fn name(&self) -> String;
}

/// A storage buffer that holds array data on a specific device.
///
/// For CPU, this is an enum over `Vec<T>` per dtype.
pub trait BackendStorage: Clone + Send + Sync + 'static {
    /// The data type of the elements in this storage.
    fn dtype(&self) -> DType;

    /// Total number of elements that fit in this storage.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Operation enums
//
// These enums parameterize the backend ops so the trait has one method per
// category instead of one method per operation. The backend matches on the
// enum inside its kernel, where the per-dtype dispatch already lives.

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
}

/// Element-wise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Square,
    Floor,
    Ceil,
    Round,
    Trunc,
}

/// Reduction operations along dimension(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

/// Comparison operations (produce U8 mask arrays).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

// Backend Trait — The core interface every backend must implement

/// The main Backend trait. Implementing this for a struct (e.g., CpuBackend)
/// makes that struct a complete compute backend for Stoat.
///
/// Most operations take storage + layout (which encodes shape/strides/offset)
/// and return new storage. The in-place group (`fill`, `copy_strided`,
/// `write_value`) instead writes *through* a layout into existing storage —
/// that is what gives views their store semantics: the caller holds the write
/// lock on a shared buffer and the kernel touches exactly the elements the
/// layout addresses.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// The device type for this backend.
    type Device: BackendDevice;
    /// The storage type for this backend.
    type Storage: BackendStorage;

    //  Creation

    /// Allocate storage filled with zeros.
    fn zeros(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Allocate storage filled with ones.
    fn ones(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Allocate storage filled with a constant value.
    fn full(shape: &Shape, val: f64, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage from a flat f64 slice, converting to the target dtype.
    fn from_f64_slice(data: &[f64], dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage with random uniform values in [0, 1).
    fn rand_uniform(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage with random normal values (mean=0, std=1).
    fn rand_normal(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    //  Element-wise binary ops

    /// Apply a binary op element-wise: result[i] = op(lhs[i], rhs[i]).
    /// The two layouts may have different but broadcast-compatible shapes;
    /// the kernel aligns them (stride-0 stretch) and handles non-contiguous
    /// access. The result is dense in the broadcast output shape.
    fn binary_op(
        op: BinaryOp,
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    //  Element-wise unary ops

    /// Apply a unary op element-wise: result[i] = op(input[i]).
    fn unary_op(op: UnaryOp, input: &Self::Storage, layout: &Layout) -> Result<Self::Storage>;

    //  Reductions

    /// Reduce along specific dimensions.
    /// If `dims` is empty, reduce over all elements to a single value.
    /// The caller computes the output shape; the result storage is dense.
    fn reduce_op(
        op: ReduceOp,
        input: &Self::Storage,
        layout: &Layout,
        dims: &[usize],
    ) -> Result<Self::Storage>;

    //  Matrix multiplication

    /// General matrix multiply: C = A @ B.
    /// Supports batched matmul for arrays with rank > 2.
    fn matmul(
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    //  Data movement

    /// Make a contiguous copy of the storage following the given layout.
    /// If the layout is already contiguous, this may just clone the storage.
    fn to_contiguous(input: &Self::Storage, layout: &Layout) -> Result<Self::Storage>;

    /// Copy data from this storage to a Vec<f64> on the host (for inspection).
    fn to_f64_vec(input: &Self::Storage, layout: &Layout) -> Result<Vec<f64>>;

    //  In-place stores (the aliasing contract)

    /// Write `value` into every element the layout addresses.
    /// The storage is shared with every view of the same buffer, so the
    /// write is visible through all of them.
    fn fill(dst: &mut Self::Storage, layout: &Layout, value: f64) -> Result<()>;

    /// Copy `src` (read through `src_layout`) into `dst` (written through
    /// `dst_layout`). Both layouts must describe the same logical shape;
    /// either side may be strided.
    fn copy_strided(
        dst: &mut Self::Storage,
        dst_layout: &Layout,
        src: &Self::Storage,
        src_layout: &Layout,
    ) -> Result<()>;

    /// Read the element at a flat storage index as f64.
    fn read_value(storage: &Self::Storage, index: usize) -> Result<f64>;

    /// Write a single element at a flat storage index.
    fn write_value(storage: &mut Self::Storage, index: usize, value: f64) -> Result<()>;

    //  Comparison ops

    /// Element-wise comparison, returns a u8 storage (0 or 1).
    fn cmp_op(
        op: CmpOp,
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    //  Affine / fused ops

    /// Affine transform: result = input * mul + add.
    /// Covers scalar scaling and shifting in one pass.
    fn affine(input: &Self::Storage, layout: &Layout, mul: f64, add: f64) -> Result<Self::Storage>;

    //  Powf

    /// Element-wise power: result[i] = input[i] ^ exponent.
    fn powf(input: &Self::Storage, layout: &Layout, exponent: f64) -> Result<Self::Storage>;

    //  Indexing

    /// Gather entries along a dimension using an index storage (I64).
    fn index_select(
        input: &Self::Storage,
        input_layout: &Layout,
        indices: &Self::Storage,
        indices_layout: &Layout,
        dim: usize,
    ) -> Result<Self::Storage>;

    //  Where / conditional select

    /// Element-wise conditional: result[i] = if mask[i] != 0 { on_true[i] } else { on_false[i] }.
    fn where_cond(
        mask: &Self::Storage,
        mask_layout: &Layout,
        on_true: &Self::Storage,
        on_true_layout: &Layout,
        on_false: &Self::Storage,
        on_false_layout: &Layout,
    ) -> Result<Self::Storage>;

    //  Dtype conversion

    /// Cast storage to a different dtype.
    ///
    /// The default implementation goes through `to_f64_vec` +
    /// `from_f64_slice`. Backends can override with a native kernel when the
    /// round-trip would lose precision or cost too much.
    fn cast(
        input: &Self::Storage,
        layout: &Layout,
        dtype: DType,
        device: &Self::Device,
    ) -> Result<Self::Storage> {
        let data = Self::to_f64_vec(input, layout)?;
        Self::from_f64_slice(&data, dtype, device)
    }
}
