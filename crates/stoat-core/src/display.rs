use std::fmt;

use crate::array::Array;
use crate::backend::Backend;
use crate::dtype::DType;
use crate::error::Result;

// Display — human-readable rendering of array contents
//
// Arrays render the way NumPy prints them: nested brackets, one row per
// line, columns right-aligned to a common width, and `...` elision when a
// dimension is long. `Debug` stays a one-line shape/dtype/device summary;
// `Display` shows the data.

/// Options controlling how array contents are rendered.
///
/// ```ignore
/// let opts = FormatOptions::default().precision(2).threshold(6);
/// println!("{}", a.to_display_string(&opts)?);
/// ```
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Decimal places used for float dtypes.
    pub precision: usize,
    /// Entries kept at each end when a dimension is elided.
    pub edge_items: usize,
    /// Dimensions longer than this are elided with `...`.
    pub threshold: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            precision: 4,
            edge_items: 3,
            threshold: 8,
        }
    }
}

impl FormatOptions {
    /// Set the number of decimal places for float dtypes.
    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Set how many entries to keep at each end of an elided dimension.
    pub fn edge_items(mut self, edge_items: usize) -> Self {
        self.edge_items = edge_items;
        self
    }

    /// Set the dimension length above which `...` elision kicks in.
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Format one element: fixed decimals for floats, plain digits for ints.
fn format_elem(v: f64, dtype: DType, precision: usize) -> String {
    if dtype.is_float() {
        format!("{:.*}", precision, v)
    } else {
        format!("{}", v as i64)
    }
}

/// Recursively render one dimension of a dense row-major buffer.
#[allow(clippy::too_many_arguments)]
fn render(
    data: &[f64],
    dims: &[usize],
    strides: &[usize],
    offset: usize,
    dim: usize,
    width: usize,
    dtype: DType,
    opts: &FormatOptions,
) -> String {
    let size = dims[dim];
    let edge = opts.edge_items;
    // Eliding only pays off when the edges don't cover everything anyway.
    let elide = size > opts.threshold && size > 2 * edge;
    let last = dim == dims.len() - 1;

    // None marks the position of the `...` entry.
    let positions: Vec<Option<usize>> = if elide {
        let mut p: Vec<Option<usize>> = (0..edge).map(Some).collect();
        p.push(None);
        p.extend((size - edge..size).map(Some));
        p
    } else {
        (0..size).map(Some).collect()
    };

    let mut parts: Vec<String> = Vec::with_capacity(positions.len());
    for pos in positions {
        match pos {
            None => parts.push("...".to_string()),
            Some(i) => {
                let child_offset = offset + i * strides[dim];
                if last {
                    let v = data[child_offset];
                    parts.push(format!(
                        "{:>w$}",
                        format_elem(v, dtype, opts.precision),
                        w = width
                    ));
                } else {
                    parts.push(render(
                        data,
                        dims,
                        strides,
                        child_offset,
                        dim + 1,
                        width,
                        dtype,
                        opts,
                    ));
                }
            }
        }
    }

    if last {
        format!("[{}]", parts.join(", "))
    } else {
        // Continuation rows line up under the opening bracket of this level.
        let sep = format!(",\n{}", " ".repeat(dim + 1));
        format!("[{}]", parts.join(&sep))
    }
}

impl<B: Backend> Array<B> {
    /// Render the array contents with the given format options.
    ///
    /// Scalars print as a bare number; higher ranks print nested brackets
    /// with aligned columns and `...` elision of long dimensions.
    pub fn to_display_string(&self, opts: &FormatOptions) -> Result<String> {
        let data = self.to_f64_vec()?;
        if self.rank() == 0 {
            return Ok(format_elem(data[0], self.dtype(), opts.precision));
        }
        if data.is_empty() {
            return Ok("[]".to_string());
        }
        let dims = self.dims().to_vec();
        let strides = self.shape().stride_contiguous();
        let width = data
            .iter()
            .map(|&v| format_elem(v, self.dtype(), opts.precision).len())
            .max()
            .unwrap_or(1);
        Ok(render(
            &data,
            &dims,
            &strides,
            0,
            0,
            width,
            self.dtype(),
            opts,
        ))
    }
}

impl<B: Backend> fmt::Display for Array<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display can't surface a Result; fall back to the summary line
        // if the storage lock is poisoned.
        match self.to_display_string(&FormatOptions::default()) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}
