use std::ops::{Bound, RangeBounds};
use std::sync::{Arc, RwLock};

use crate::backend::{Backend, BinaryOp, CmpOp, ReduceOp, UnaryOp};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::shape::Shape;

// Array — The fundamental data structure
//
// An Array is an n-dimensional grid of numbers. Like in NumPy, our Array:
//
//   1. Holds data in a single flat storage buffer on some backend
//   2. Has a shape (e.g., [rows, cols])
//   3. Has a dtype (f32, f64, u8, i64)
//   4. Can be sliced into views that share the same buffer
//
// ARCHITECTURE:
//
//   Array<B: Backend> is generic over the backend. Operations are dispatched
//   via the Backend trait, so the handle type and all the shape logic live
//   here while the per-dtype kernels live in the backend crate.
//
// MEMORY MODEL:
//
//   The inner data is wrapped in Arc (atomic reference counting).
//   Cloning an Array is cheap (just increments a counter), and views
//   (slice, transpose, broadcast) are new handles pointing at the SAME
//   storage Arc with a different Layout.
//
//   Storage is behind Arc<RwLock<Storage>> so that:
//   - Reads (arithmetic, display, copies) take the read lock
//   - In-place stores (fill, assign, set) take the write lock
//
//   This is what gives slices their aliasing semantics: `b.slice(0, 3..5)`
//   addresses a sub-region of b's buffer, and `fill`/`assign`/`set` through
//   the slice mutate that buffer, visible through b and every other view.
//   The buffer itself is freed when the last handle drops.
//
//   `copy()` is the one escape hatch: it always materializes fresh storage,
//   so the result never aliases anything.

/// Inner data of an array, shared via Arc.
struct ArrayInner<B: Backend> {
    /// The raw data stored on the backend's device.
    storage: Arc<RwLock<B::Storage>>,
    /// Memory layout: shape + strides + offset.
    layout: Layout,
    /// Data type of the elements.
    dtype: DType,
    /// The device this array lives on.
    device: B::Device,
}

/// An n-dimensional array of numbers on a specific backend.
///
/// # Type Parameter
/// - `B: Backend` — the compute backend (e.g., `CpuBackend`)
///
/// # Example
/// ```ignore
/// use stoat_core::{Array, DType};
/// use stoat_cpu::{CpuBackend, CpuDevice};
///
/// let a = Array::<CpuBackend>::arange(10, DType::I64, &CpuDevice)?;
/// let s = a.slice(0, 3..5)?;   // view into a's buffer
/// s.fill(0.0)?;                // a is now [0,1,2,0,0,5,6,7,8,9]
/// ```
pub struct Array<B: Backend> {
    inner: Arc<ArrayInner<B>>,
}

// Manual Clone: Arc::clone is cheap (just increment refcount).
impl<B: Backend> Clone for Array<B> {
    fn clone(&self) -> Self {
        Array {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Array<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Array(shape={}, dtype={}, device={:?})",
            self.inner.layout.shape(),
            self.inner.dtype,
            self.inner.device,
        )
    }
}

impl<B: Backend> Array<B> {
    // Internal constructors

    /// Create an array from existing storage and layout.
    pub(crate) fn from_storage(
        storage: B::Storage,
        layout: Layout,
        dtype: DType,
        device: B::Device,
    ) -> Self {
        Array {
            inner: Arc::new(ArrayInner {
                storage: Arc::new(RwLock::new(storage)),
                layout,
                dtype,
                device,
            }),
        }
    }

    /// Create a view sharing the same storage but with a different layout.
    fn view_with_layout(&self, layout: Layout) -> Self {
        Array {
            inner: Arc::new(ArrayInner {
                storage: Arc::clone(&self.inner.storage),
                layout,
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
            }),
        }
    }

    // Accessors

    /// The shape of this array.
    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    /// The dimensions as a slice (shortcut for shape().dims()).
    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    /// Total number of elements.
    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    /// Data type of the elements.
    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    /// The device this array is on.
    pub fn device(&self) -> &B::Device {
        &self.inner.device
    }

    /// The memory layout (shape + strides + offset).
    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    /// Whether this array is contiguous in memory.
    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Whether this array and `other` are views of the same storage buffer.
    /// When true, a write through either is visible through both.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner.storage, &other.inner.storage)
    }

    /// Try to acquire a read lock on storage, returning an error instead of panicking.
    fn read_storage(&self) -> Result<std::sync::RwLockReadGuard<'_, B::Storage>> {
        self.inner
            .storage
            .read()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    /// Try to acquire a write lock on storage, returning an error instead of panicking.
    fn write_storage(&self) -> Result<std::sync::RwLockWriteGuard<'_, B::Storage>> {
        self.inner
            .storage
            .write()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    // Creation methods

    /// Create an array filled with zeros.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let layout = Layout::contiguous(shape.clone());
        let storage = B::zeros(&shape, dtype, device)?;
        Ok(Self::from_storage(storage, layout, dtype, device.clone()))
    }

    /// Create an array filled with ones.
    pub fn ones(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let layout = Layout::contiguous(shape.clone());
        let storage = B::ones(&shape, dtype, device)?;
        Ok(Self::from_storage(storage, layout, dtype, device.clone()))
    }

    /// Create an array filled with a constant value.
    pub fn full(
        shape: impl Into<Shape>,
        val: f64,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let layout = Layout::contiguous(shape.clone());
        let storage = B::full(&shape, val, dtype, device)?;
        Ok(Self::from_storage(storage, layout, dtype, device.clone()))
    }

    /// Create an array from a flat slice of f64 values.
    /// The data is converted to the specified dtype.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                shape: shape.clone(),
                expected: shape.elem_count(),
                got: data.len(),
            });
        }
        let layout = Layout::contiguous(shape);
        let storage = B::from_f64_slice(data, dtype, device)?;
        Ok(Self::from_storage(storage, layout, dtype, device.clone()))
    }

    /// Create an array with random uniform values in [0, 1).
    pub fn rand(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let layout = Layout::contiguous(shape.clone());
        let storage = B::rand_uniform(&shape, dtype, device)?;
        Ok(Self::from_storage(storage, layout, dtype, device.clone()))
    }

    /// Create an array with random normal values (mean=0, std=1).
    pub fn randn(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let layout = Layout::contiguous(shape.clone());
        let storage = B::rand_normal(&shape, dtype, device)?;
        Ok(Self::from_storage(storage, layout, dtype, device.clone()))
    }

    /// Create a 1-D array with values [0, 1, ..., n-1].
    pub fn arange(n: usize, dtype: DType, device: &B::Device) -> Result<Self> {
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Self::from_f64_slice(&data, n, dtype, device)
    }

    /// Create a 1-D array with values [start, start+step, ..., <end).
    pub fn arange_step(
        start: f64,
        end: f64,
        step: f64,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        if step == 0.0 {
            return Err(Error::msg("arange_step: step cannot be zero"));
        }
        let mut data = Vec::new();
        let mut v = start;
        if step > 0.0 {
            while v < end {
                data.push(v);
                v += step;
            }
        } else {
            while v > end {
                data.push(v);
                v += step;
            }
        }
        let len = data.len();
        Self::from_f64_slice(&data, len, dtype, device)
    }

    /// Create a 1-D array with `steps` evenly spaced values from `start` to `end` (inclusive).
    ///
    /// ```ignore
    /// let a = Array::linspace(0.0, 1.0, 5, DType::F64, &dev)?;
    /// // => [0.0, 0.25, 0.5, 0.75, 1.0]
    /// ```
    pub fn linspace(
        start: f64,
        end: f64,
        steps: usize,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        if steps == 0 {
            return Err(Error::msg("linspace requires steps >= 1"));
        }
        if steps == 1 {
            return Self::from_f64_slice(&[start], 1, dtype, device);
        }
        let step = (end - start) / (steps as f64 - 1.0);
        let data: Vec<f64> = (0..steps).map(|i| start + step * i as f64).collect();
        Self::from_f64_slice(&data, steps, dtype, device)
    }

    /// Create an identity matrix of size `n × n`.
    ///
    /// ```ignore
    /// let i = Array::eye(3, DType::F64, &dev)?;
    /// // [[1, 0, 0],
    /// //  [0, 1, 0],
    /// //  [0, 0, 1]]
    /// ```
    pub fn eye(n: usize, dtype: DType, device: &B::Device) -> Result<Self> {
        let mut data = vec![0.0f64; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self::from_f64_slice(&data, (n, n), dtype, device)
    }

    /// Create an array of zeros with the same shape, dtype, and device as `other`.
    pub fn zeros_like(other: &Self) -> Result<Self> {
        Self::zeros(other.shape().clone(), other.dtype(), other.device())
    }

    /// Create an array of ones with the same shape, dtype, and device as `other`.
    pub fn ones_like(other: &Self) -> Result<Self> {
        Self::ones(other.shape().clone(), other.dtype(), other.device())
    }

    /// Create an array filled with `val`, with the same shape, dtype, and device as `other`.
    pub fn full_like(other: &Self, val: f64) -> Result<Self> {
        Self::full(other.shape().clone(), val, other.dtype(), other.device())
    }

    // Shape manipulation (these create views, no data copy)

    /// Transpose two dimensions (no data copy).
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        let new_layout = self.inner.layout.transpose(dim0, dim1)?;
        Ok(self.view_with_layout(new_layout))
    }

    /// Transpose a 2D matrix (shorthand for transpose(0, 1)).
    pub fn t(&self) -> Result<Self> {
        if self.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: self.rank(),
            });
        }
        self.transpose(0, 1)
    }

    /// Narrow along a dimension: keep `len` entries starting at `start`.
    /// Returns a view into the same storage (offset/stride arithmetic only).
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Self> {
        let new_layout = self.inner.layout.narrow(dim, start, len)?;
        Ok(self.view_with_layout(new_layout))
    }

    /// Slice along a dimension with any range expression.
    ///
    /// Returns a zero-copy view: the result addresses a sub-region of this
    /// array's buffer, and in-place stores through it (`fill`, `assign`,
    /// `set`) are visible through every other view of the same buffer.
    ///
    /// ```ignore
    /// let b = Array::arange(10, DType::I64, &dev)?;
    /// let s = b.slice(0, 3..5)?;   // elements 3, 4
    /// let t = b.slice(0, ..3)?;    // elements 0, 1, 2
    /// let u = b.slice(0, 7..)?;    // elements 7, 8, 9
    /// ```
    ///
    /// An empty range (e.g. `3..3`) yields a zero-length view; stores through
    /// it touch nothing. Out-of-bounds ranges are an error, not a clamp.
    pub fn slice(&self, dim: usize, range: impl RangeBounds<usize>) -> Result<Self> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        let dim_size = self.dims()[dim];
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e + 1,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => dim_size,
        };
        if start > end || end > dim_size {
            return Err(Error::SliceOutOfBounds {
                dim,
                start,
                len: end.saturating_sub(start),
                dim_size,
            });
        }
        self.narrow(dim, start, end - start)
    }

    /// Select a single entry along a dimension, dropping that dimension.
    ///
    /// `select(0, 1)` on a [3, 4] matrix is its second row as a [4] view.
    /// Like `slice`, the result aliases this array's buffer.
    pub fn select(&self, dim: usize, index: usize) -> Result<Self> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        let dim_size = self.dims()[dim];
        if index >= dim_size {
            return Err(Error::IndexOutOfBounds {
                index,
                dim,
                dim_size,
            });
        }
        self.narrow(dim, index, 1)?.squeeze(dim)
    }

    /// Reshape to a new shape. The new shape must have the same total elements.
    /// If the array is not contiguous, it will be made contiguous first
    /// (which copies; the result then no longer aliases this array).
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Self> {
        let new_shape = new_shape.into();
        let current_count = self.elem_count();
        let new_count = new_shape.elem_count();
        if current_count != new_count {
            return Err(Error::ReshapeElementMismatch {
                src: current_count,
                dst: new_count,
                dst_shape: new_shape,
            });
        }
        // If not contiguous, make a contiguous copy first
        let array = if self.is_contiguous() {
            self.clone()
        } else {
            self.contiguous()?
        };
        let new_layout = Layout::contiguous(new_shape);
        Ok(array.view_with_layout(new_layout))
    }

    /// Ensure the array is contiguous in memory.
    /// If already contiguous, returns a clone (cheap Arc copy, still aliasing).
    /// Otherwise, copies the data into a new contiguous storage.
    pub fn contiguous(&self) -> Result<Self> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        let storage = self.read_storage()?;
        let new_storage = B::to_contiguous(&storage, &self.inner.layout)?;
        let new_layout = Layout::contiguous(self.shape().clone());
        Ok(Self::from_storage(
            new_storage,
            new_layout,
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    /// Materialize an independent copy of this array.
    ///
    /// Unlike `contiguous()`, this ALWAYS allocates fresh storage, even when
    /// the layout is already dense. The result never aliases this array:
    /// subsequent writes to either side are invisible to the other.
    pub fn copy(&self) -> Result<Self> {
        let storage = self.read_storage()?;
        let new_storage = B::to_contiguous(&storage, &self.inner.layout)?;
        let new_layout = Layout::contiguous(self.shape().clone());
        Ok(Self::from_storage(
            new_storage,
            new_layout,
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    /// Add a dimension of size 1 at the given position.
    /// unsqueeze(0) on [3, 4] → [1, 3, 4]
    /// unsqueeze(2) on [3, 4] → [3, 4, 1]
    pub fn unsqueeze(&self, dim: usize) -> Result<Self> {
        let rank = self.rank();
        if dim > rank {
            return Err(Error::DimOutOfRange {
                dim,
                rank: rank + 1,
            });
        }
        let mut new_dims = self.dims().to_vec();
        let mut new_strides = self.layout().strides().to_vec();
        // The stride for a size-1 dim doesn't matter (you never move along it),
        // but convention is to use the stride of the next dimension (or 1 if last).
        let stride_val = if dim < rank { new_strides[dim] } else { 1 };
        new_dims.insert(dim, 1);
        new_strides.insert(dim, stride_val);
        let new_layout = Layout::new(Shape::new(new_dims), new_strides, self.layout().offset());
        Ok(self.view_with_layout(new_layout))
    }

    /// Remove a specific dimension of size 1.
    ///
    /// squeeze(1) on [3, 1, 4] → [3, 4]
    ///
    /// Returns an error if the specified dimension is not size 1.
    pub fn squeeze(&self, dim: usize) -> Result<Self> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        if self.dims()[dim] != 1 {
            return Err(Error::msg(format!(
                "squeeze: dimension {} has size {}, expected 1",
                dim,
                self.dims()[dim]
            )));
        }
        let mut new_dims = self.dims().to_vec();
        let mut new_strides = self.layout().strides().to_vec();
        new_dims.remove(dim);
        new_strides.remove(dim);
        let new_layout = Layout::new(Shape::new(new_dims), new_strides, self.layout().offset());
        Ok(self.view_with_layout(new_layout))
    }

    /// Remove all dimensions of size 1.
    /// squeeze_all on [1, 3, 1, 4] → [3, 4]
    pub fn squeeze_all(&self) -> Self {
        let new_dims: Vec<usize> = self.dims().iter().copied().filter(|&d| d != 1).collect();
        let new_strides: Vec<usize> = self
            .dims()
            .iter()
            .zip(self.layout().strides().iter())
            .filter(|(&d, _)| d != 1)
            .map(|(_, &s)| s)
            .collect();
        let new_layout = Layout::new(Shape::new(new_dims), new_strides, self.layout().offset());
        self.view_with_layout(new_layout)
    }

    /// Permute the dimensions of this array.
    ///
    /// permute(&[2, 0, 1]) on [A, B, C] → [C, A, B]
    ///
    /// This is a generalization of transpose to arbitrary dimension orderings.
    /// No data copy — just changes strides.
    pub fn permute(&self, dims: &[usize]) -> Result<Self> {
        let rank = self.rank();
        if dims.len() != rank {
            return Err(Error::msg(format!(
                "permute: expected {} dimensions, got {}",
                rank,
                dims.len()
            )));
        }
        // Check for duplicates and out-of-range
        let mut seen = vec![false; rank];
        for &d in dims {
            if d >= rank {
                return Err(Error::DimOutOfRange { dim: d, rank });
            }
            if seen[d] {
                return Err(Error::msg(format!("permute: duplicate dimension {}", d)));
            }
            seen[d] = true;
        }

        let old_dims = self.dims();
        let old_strides = self.layout().strides();
        let new_dims: Vec<usize> = dims.iter().map(|&d| old_dims[d]).collect();
        let new_strides: Vec<usize> = dims.iter().map(|&d| old_strides[d]).collect();
        let new_layout = Layout::new(Shape::new(new_dims), new_strides, self.layout().offset());
        Ok(self.view_with_layout(new_layout))
    }

    /// Broadcast this array to a larger shape (no data copy).
    ///
    /// Size-1 dimensions are stretched with stride 0, so every position along
    /// them reads the same storage element. The result is a view.
    pub fn broadcast_to(&self, shape: impl Into<Shape>) -> Result<Self> {
        let target = shape.into();
        let new_layout = self.inner.layout.broadcast_to(&target)?;
        Ok(self.view_with_layout(new_layout))
    }

    // In-place stores
    //
    // These are the write half of the aliasing contract. They mutate the
    // shared storage through this handle's layout, under the write lock, so
    // the effect is visible through every view of the same buffer. They
    // deliberately take &self: views are handles, and a store through a view
    // is a store into the buffer it describes.

    /// Fill every element this array (or view) addresses with `value`.
    ///
    /// ```ignore
    /// let b = Array::arange(10, DType::I64, &dev)?;
    /// b.slice(0, 3..5)?.fill(0.0)?;
    /// // b is now [0, 1, 2, 0, 0, 5, 6, 7, 8, 9]
    /// ```
    pub fn fill(&self, value: f64) -> Result<()> {
        let mut guard = self.write_storage()?;
        B::fill(&mut guard, &self.inner.layout, value)
    }

    /// Store `src` into the elements this array (or view) addresses.
    ///
    /// `src` is broadcast to this array's shape, then written element by
    /// element through both strided layouts. Dtypes must match.
    ///
    /// If `src` aliases this array's buffer (e.g. assigning one slice of an
    /// array into another slice of the same array), a snapshot of `src` is
    /// taken first so the store reads consistent values.
    pub fn assign(&self, src: &Self) -> Result<()> {
        if self.dtype() != src.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: src.dtype(),
            });
        }
        // Reading src while holding the write lock on the same buffer would
        // deadlock, so detach src onto fresh storage first.
        let src = if self.shares_storage(src) {
            src.copy()?
        } else {
            src.clone()
        };
        let src_layout = src.inner.layout.broadcast_to(self.shape())?;
        let src_guard = src.read_storage()?;
        let mut dst_guard = self.write_storage()?;
        B::copy_strided(&mut dst_guard, &self.inner.layout, &src_guard, &src_layout)
    }

    /// Write a single element. `index` must have one entry per dimension.
    pub fn set(&self, index: &[usize], value: f64) -> Result<()> {
        let flat = self.checked_flat_index(index)?;
        let mut guard = self.write_storage()?;
        B::write_value(&mut guard, flat, value)
    }

    /// Read a single element. `index` must have one entry per dimension.
    pub fn get(&self, index: &[usize]) -> Result<f64> {
        let flat = self.checked_flat_index(index)?;
        let guard = self.read_storage()?;
        B::read_value(&guard, flat)
    }

    /// Bounds-check a multi-dimensional index and resolve it to a flat
    /// storage position through this array's layout.
    fn checked_flat_index(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.rank() {
            return Err(Error::RankMismatch {
                expected: self.rank(),
                got: index.len(),
            });
        }
        for (dim, (&idx, &dim_size)) in index.iter().zip(self.dims().iter()).enumerate() {
            if idx >= dim_size {
                return Err(Error::IndexOutOfBounds {
                    index: idx,
                    dim,
                    dim_size,
                });
            }
        }
        Ok(self.inner.layout.flat_index(index))
    }

    // Arithmetic operations

    /// Element-wise addition: self + rhs (with broadcasting).
    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Add)
    }

    /// Element-wise subtraction: self - rhs (with broadcasting).
    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Sub)
    }

    /// Element-wise multiplication: self * rhs (with broadcasting).
    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Mul)
    }

    /// Element-wise division: self / rhs (with broadcasting).
    pub fn div(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Div)
    }

    /// Element-wise maximum of self and rhs (with broadcasting).
    pub fn maximum(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Maximum)
    }

    /// Element-wise minimum of self and rhs (with broadcasting).
    pub fn minimum(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Minimum)
    }

    /// Generic binary operation dispatch.
    fn binary_op(&self, rhs: &Self, op: BinaryOp) -> Result<Self> {
        if self.dtype() != rhs.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: rhs.dtype(),
            });
        }
        let storage_lhs = self.read_storage()?;
        let storage_rhs = rhs.read_storage()?;
        let result = B::binary_op(
            op,
            &storage_lhs,
            &self.inner.layout,
            &storage_rhs,
            &rhs.inner.layout,
        )?;
        // Compute broadcast output shape
        let result_shape = Shape::broadcast_shape(self.shape(), rhs.shape())?;
        let result_layout = Layout::contiguous(result_shape);
        Ok(Self::from_storage(
            result,
            result_layout,
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    // Comparison operations

    /// Element-wise equal: self == rhs. Returns a U8 mask (0 or 1).
    pub fn eq(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Eq)
    }

    /// Element-wise not-equal: self != rhs. Returns a U8 mask (0 or 1).
    pub fn ne(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Ne)
    }

    /// Element-wise greater-than: self > rhs. Returns a U8 mask (0 or 1).
    pub fn gt(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Gt)
    }

    /// Element-wise greater-or-equal: self >= rhs. Returns a U8 mask (0 or 1).
    pub fn ge(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Ge)
    }

    /// Element-wise less-than: self < rhs. Returns a U8 mask (0 or 1).
    pub fn lt(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Lt)
    }

    /// Element-wise less-or-equal: self <= rhs. Returns a U8 mask (0 or 1).
    pub fn le(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Le)
    }

    /// Generic comparison operation dispatch. Produces a U8-dtype mask.
    fn cmp_op(&self, rhs: &Self, op: CmpOp) -> Result<Self> {
        let storage_lhs = self.read_storage()?;
        let storage_rhs = rhs.read_storage()?;
        let result = B::cmp_op(
            op,
            &storage_lhs,
            &self.inner.layout,
            &storage_rhs,
            &rhs.inner.layout,
        )?;
        let result_shape = Shape::broadcast_shape(self.shape(), rhs.shape())?;
        let result_layout = Layout::contiguous(result_shape);
        Ok(Self::from_storage(
            result,
            result_layout,
            DType::U8,
            self.inner.device.clone(),
        ))
    }

    // Unary operations

    /// Element-wise negation: -self.
    pub fn neg(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Neg)
    }

    /// Element-wise absolute value.
    pub fn abs(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Abs)
    }

    /// Element-wise exponential: e^x.
    pub fn exp(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Exp)
    }

    /// Element-wise natural logarithm.
    pub fn log(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Log)
    }

    /// Element-wise square root.
    pub fn sqrt(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Sqrt)
    }

    /// Element-wise square: x².
    pub fn square(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Square)
    }

    /// Element-wise floor: largest integer ≤ x.
    pub fn floor(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Floor)
    }

    /// Element-wise ceiling: smallest integer ≥ x.
    pub fn ceil(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Ceil)
    }

    /// Element-wise round to nearest integer (half away from zero).
    pub fn round(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Round)
    }

    /// Element-wise truncation toward zero.
    pub fn trunc(&self) -> Result<Self> {
        self.unary_op(UnaryOp::Trunc)
    }

    /// Split into fractional and integral parts: returns `(fractional, integral)`.
    ///
    /// Both parts carry the sign of the input: modf on -1.5 gives (-0.5, -1.0).
    pub fn modf(&self) -> Result<(Self, Self)> {
        let integral = self.trunc()?;
        let fractional = self.sub(&integral)?;
        Ok((fractional, integral))
    }

    /// Generic unary operation dispatch.
    fn unary_op(&self, op: UnaryOp) -> Result<Self> {
        let storage = self.read_storage()?;
        let result = B::unary_op(op, &storage, &self.inner.layout)?;
        let result_layout = Layout::contiguous(self.shape().clone());
        Ok(Self::from_storage(
            result,
            result_layout,
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    /// Affine transform: result[i] = self[i] * mul + add.
    /// Covers scalar scaling (`a * 10`) and shifting (`a + 1`) in one pass.
    pub fn affine(&self, mul: f64, add: f64) -> Result<Self> {
        let storage = self.read_storage()?;
        let result = B::affine(&storage, &self.inner.layout, mul, add)?;
        let result_layout = Layout::contiguous(self.shape().clone());
        Ok(Self::from_storage(
            result,
            result_layout,
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    /// Element-wise power: self^exponent.
    pub fn powf(&self, exponent: f64) -> Result<Self> {
        let storage = self.read_storage()?;
        let result = B::powf(&storage, &self.inner.layout, exponent)?;
        let result_layout = Layout::contiguous(self.shape().clone());
        Ok(Self::from_storage(
            result,
            result_layout,
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    /// Element-wise reciprocal: `1 / x`.
    pub fn reciprocal(&self) -> Result<Self> {
        let one = Self::ones(self.dims(), self.dtype(), self.device())?;
        one.div(self)
    }

    // Conditional select and fancy indexing

    /// Conditional select: result[i] = if mask[i] != 0 { on_true[i] } else { on_false[i] }.
    ///
    /// `mask` is typically a U8 array from comparison ops; it is broadcast to
    /// the shape of `on_true`/`on_false`, which must match each other.
    pub fn where_cond(mask: &Self, on_true: &Self, on_false: &Self) -> Result<Self> {
        if on_true.dtype() != on_false.dtype() {
            return Err(Error::DTypeMismatch {
                expected: on_true.dtype(),
                got: on_false.dtype(),
            });
        }
        if on_true.shape() != on_false.shape() {
            return Err(Error::ShapeMismatch {
                expected: on_true.shape().clone(),
                got: on_false.shape().clone(),
            });
        }
        let mask_layout = mask.inner.layout.broadcast_to(on_true.shape())?;
        let mask_s = mask.read_storage()?;
        let true_s = on_true.read_storage()?;
        let false_s = on_false.read_storage()?;
        let result = B::where_cond(
            &mask_s,
            &mask_layout,
            &true_s,
            &on_true.inner.layout,
            &false_s,
            &on_false.inner.layout,
        )?;
        let result_layout = Layout::contiguous(on_true.shape().clone());
        Ok(Self::from_storage(
            result,
            result_layout,
            on_true.inner.dtype,
            on_true.inner.device.clone(),
        ))
    }

    /// Select entries along `dim` using a 1-D I64 index array.
    ///
    /// The output is a fresh array (not a view) with the same rank, `dim`
    /// resized to `indices.len()`. Indices may repeat and appear in any
    /// order; out-of-range indices are an error.
    pub fn index_select(&self, dim: usize, indices: &Self) -> Result<Self> {
        if dim >= self.rank() {
            return Err(Error::DimOutOfRange {
                dim,
                rank: self.rank(),
            });
        }
        if indices.dtype() != DType::I64 {
            return Err(Error::DTypeMismatch {
                expected: DType::I64,
                got: indices.dtype(),
            });
        }
        if indices.rank() != 1 {
            return Err(Error::RankMismatch {
                expected: 1,
                got: indices.rank(),
            });
        }
        let guard = self.read_storage()?;
        let idx_guard = indices.read_storage()?;
        let storage = B::index_select(
            &guard,
            &self.inner.layout,
            &idx_guard,
            &indices.inner.layout,
            dim,
        )?;
        let mut out_dims = self.dims().to_vec();
        out_dims[dim] = indices.elem_count();
        let layout = Layout::contiguous(Shape::new(out_dims));
        Ok(Self::from_storage(
            storage,
            layout,
            self.dtype(),
            self.device().clone(),
        ))
    }

    // Ordering and scans (host-side)

    /// Sort along a dimension. Returns `(sorted_values, indices)` where the
    /// indices (I64) give each sorted element's original position along `dim`.
    ///
    /// ```ignore
    /// let (vals, idxs) = x.sort(0, false)?; // ascending along dim 0
    /// ```
    pub fn sort(&self, dim: usize, descending: bool) -> Result<(Self, Self)> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        let t = self.contiguous()?;
        let data = t.to_f64_vec()?;
        let shape = t.shape().clone();
        let dims = shape.dims();
        let dim_size = dims[dim];
        let inner: usize = dims[dim + 1..].iter().product();
        let outer: usize = dims[..dim].iter().product();

        let mut sorted_data = data.clone();
        let mut indices = vec![0.0f64; data.len()];

        for o in 0..outer {
            for i in 0..inner {
                // Extract the lane along dim
                let mut lane: Vec<(f64, usize)> = (0..dim_size)
                    .map(|d| {
                        let idx = (o * dim_size + d) * inner + i;
                        (data[idx], d)
                    })
                    .collect();

                if descending {
                    lane.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                } else {
                    lane.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                }

                for (d, (val, orig_idx)) in lane.into_iter().enumerate() {
                    let idx = (o * dim_size + d) * inner + i;
                    sorted_data[idx] = val;
                    indices[idx] = orig_idx as f64;
                }
            }
        }

        let vals = Self::from_f64_slice(&sorted_data, shape.clone(), t.dtype(), t.device())?;
        let idxs = Self::from_f64_slice(&indices, shape, DType::I64, t.device())?;
        Ok((vals, idxs))
    }

    /// Argsort: returns I64 indices that would sort the array along `dim`.
    pub fn argsort(&self, dim: usize, descending: bool) -> Result<Self> {
        let (_, indices) = self.sort(dim, descending)?;
        Ok(indices)
    }

    /// Cumulative sum along dimension `dim`.
    ///
    /// ```ignore
    /// // [1, 2, 3] → [1, 3, 6]
    /// let y = x.cumsum(0)?;
    /// ```
    pub fn cumsum(&self, dim: usize) -> Result<Self> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }
        let t = self.contiguous()?;
        let data = t.to_f64_vec()?;
        let shape = t.shape().clone();
        let dims = shape.dims();
        let mut out = data.clone();

        let inner: usize = dims[dim + 1..].iter().product();
        let outer: usize = dims[..dim].iter().product();
        let dim_size = dims[dim];

        for o in 0..outer {
            for i in 0..inner {
                for d in 1..dim_size {
                    let idx = (o * dim_size + d) * inner + i;
                    let prev = (o * dim_size + d - 1) * inner + i;
                    out[idx] += out[prev];
                }
            }
        }

        Self::from_f64_slice(&out, shape, t.dtype(), t.device())
    }

    // Reductions

    /// Sum all elements, returning a scalar array.
    pub fn sum_all(&self) -> Result<Self> {
        self.reduce_op(ReduceOp::Sum, &[], false)
    }

    /// Sum along a specific dimension.
    pub fn sum(&self, dim: usize, keep_dim: bool) -> Result<Self> {
        self.reduce_op(ReduceOp::Sum, &[dim], keep_dim)
    }

    /// Mean of all elements, returning a scalar array.
    pub fn mean_all(&self) -> Result<Self> {
        self.reduce_op(ReduceOp::Mean, &[], false)
    }

    /// Mean along a specific dimension.
    pub fn mean(&self, dim: usize, keep_dim: bool) -> Result<Self> {
        self.reduce_op(ReduceOp::Mean, &[dim], keep_dim)
    }

    /// Maximum over all elements, returning a scalar array.
    pub fn max_all(&self) -> Result<Self> {
        self.reduce_op(ReduceOp::Max, &[], false)
    }

    /// Max along a specific dimension.
    pub fn max(&self, dim: usize, keep_dim: bool) -> Result<Self> {
        self.reduce_op(ReduceOp::Max, &[dim], keep_dim)
    }

    /// Minimum over all elements, returning a scalar array.
    pub fn min_all(&self) -> Result<Self> {
        self.reduce_op(ReduceOp::Min, &[], false)
    }

    /// Min along a specific dimension.
    pub fn min(&self, dim: usize, keep_dim: bool) -> Result<Self> {
        self.reduce_op(ReduceOp::Min, &[dim], keep_dim)
    }

    /// Generic reduction dispatch.
    fn reduce_op(&self, op: ReduceOp, dims: &[usize], keep_dim: bool) -> Result<Self> {
        // Validate dimensions
        for &d in dims {
            if d >= self.rank() {
                return Err(Error::DimOutOfRange {
                    dim: d,
                    rank: self.rank(),
                });
            }
        }
        let storage = self.read_storage()?;
        let result = B::reduce_op(op, &storage, &self.inner.layout, dims)?;

        // Compute result shape
        let result_shape = if dims.is_empty() {
            // Reduce all → scalar
            Shape::from(())
        } else if keep_dim {
            let mut new_dims = self.dims().to_vec();
            for &d in dims {
                new_dims[d] = 1;
            }
            Shape::new(new_dims)
        } else {
            let new_dims: Vec<usize> = self
                .dims()
                .iter()
                .enumerate()
                .filter(|(i, _)| !dims.contains(i))
                .map(|(_, &d)| d)
                .collect();
            Shape::new(new_dims)
        };

        let result_layout = Layout::contiguous(result_shape);
        Ok(Self::from_storage(
            result,
            result_layout,
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    // Matrix multiplication

    /// Matrix multiplication: self @ rhs.
    ///
    /// - [m, k] @ [k, n] → [m, n]
    /// - Batched: [b, m, k] @ [b, k, n] → [b, m, n]
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        if self.dtype() != rhs.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: rhs.dtype(),
            });
        }
        // Validate shapes for matmul
        if self.rank() < 2 || rhs.rank() < 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: self.rank().min(rhs.rank()),
            });
        }
        let lhs_dims = self.dims();
        let rhs_dims = rhs.dims();
        let k1 = lhs_dims[lhs_dims.len() - 1];
        let k2 = rhs_dims[rhs_dims.len() - 2];
        if k1 != k2 {
            let m = lhs_dims[lhs_dims.len() - 2];
            let n = rhs_dims[rhs_dims.len() - 1];
            return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
        }

        let storage_lhs = self.read_storage()?;
        let storage_rhs = rhs.read_storage()?;
        let result = B::matmul(
            &storage_lhs,
            &self.inner.layout,
            &storage_rhs,
            &rhs.inner.layout,
        )?;

        // Result shape: [..., m, n]
        let m = lhs_dims[lhs_dims.len() - 2];
        let n = rhs_dims[rhs_dims.len() - 1];
        let mut result_dims: Vec<usize> = lhs_dims[..lhs_dims.len() - 2].to_vec();
        result_dims.push(m);
        result_dims.push(n);
        let result_layout = Layout::contiguous(Shape::new(result_dims));
        Ok(Self::from_storage(
            result,
            result_layout,
            self.inner.dtype,
            self.inner.device.clone(),
        ))
    }

    /// Dot product, following the rank of the operands:
    ///
    /// - 1-D · 1-D → scalar inner product
    /// - 1-D · 2-D → vector-matrix product, shape [n]
    /// - 2-D · 1-D → matrix-vector product, shape [m]
    /// - otherwise → `matmul`
    pub fn dot(&self, rhs: &Self) -> Result<Self> {
        match (self.rank(), rhs.rank()) {
            (1, 1) => {
                if self.dims()[0] != rhs.dims()[0] {
                    return Err(Error::ShapeMismatch {
                        expected: self.shape().clone(),
                        got: rhs.shape().clone(),
                    });
                }
                self.mul(rhs)?.sum_all()
            }
            (1, 2) => self.unsqueeze(0)?.matmul(rhs)?.squeeze(0),
            (2, 1) => self.matmul(&rhs.unsqueeze(1)?)?.squeeze(1),
            _ => self.matmul(rhs),
        }
    }

    // Data extraction

    /// Extract all elements as a flat Vec<f64>, in logical (row-major) order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let storage = self.read_storage()?;
        B::to_f64_vec(&storage, &self.inner.layout)
    }

    /// Extract a scalar value (array must have exactly 1 element).
    pub fn to_scalar_f64(&self) -> Result<f64> {
        if self.elem_count() != 1 {
            return Err(Error::NotAScalar {
                shape: self.shape().clone(),
            });
        }
        let vec = self.to_f64_vec()?;
        Ok(vec[0])
    }

    /// Convert this array to a different dtype.
    ///
    /// Returns a new array with the same shape but different element type.
    /// Converting to the current dtype returns a cheap clone (still aliasing).
    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        let guard = self.read_storage()?;
        let storage = B::cast(&guard, &self.inner.layout, dtype, self.device())?;
        let layout = Layout::contiguous(self.shape().clone());
        Ok(Self::from_storage(
            storage,
            layout,
            dtype,
            self.device().clone(),
        ))
    }
}
