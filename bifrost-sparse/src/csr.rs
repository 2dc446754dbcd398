use itertools::izip;
use num::Zero;
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Mul};

/// A sparse matrix in compressed-sparse-row format.
///
/// Invariants: `row_offsets` has length `nrows + 1`, starts at zero, is
/// monotonically non-decreasing and ends at `nnz`; column indices are sorted
/// and unique within each row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrTensor<T> {
    nrows: usize,
    ncols: usize,
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<T>,
}

impl<T> CsrTensor<T> {
    /// Builds a CSR matrix from raw data, checking the format invariants.
    ///
    /// # Panics
    ///
    /// Panics if the offsets or column indices violate the CSR invariants.
    pub fn from_csr_data(
        nrows: usize,
        ncols: usize,
        row_offsets: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        assert_eq!(
            row_offsets.len(),
            nrows + 1,
            "row_offsets must have length nrows + 1"
        );
        assert_eq!(row_offsets[0], 0, "row_offsets must start at 0");
        assert_eq!(
            *row_offsets.last().unwrap(),
            col_indices.len(),
            "row_offsets must end at nnz"
        );
        assert_eq!(col_indices.len(), values.len());
        for (begin, end) in row_offsets.iter().zip(&row_offsets[1..]) {
            assert!(begin <= end, "row_offsets must be non-decreasing");
            let cols = &col_indices[*begin..*end];
            assert!(
                cols.windows(2).all(|w| w[0] < w[1]),
                "column indices must be sorted and unique within each row"
            );
            assert!(cols.iter().all(|&j| j < ncols), "col index out of bounds");
        }
        Self {
            nrows,
            ncols,
            row_offsets,
            col_indices,
            values,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// The column indices and values of row `i`.
    pub fn row(&self, i: usize) -> (&[usize], &[T]) {
        let begin = self.row_offsets[i];
        let end = self.row_offsets[i + 1];
        (&self.col_indices[begin..end], &self.values[begin..end])
    }

    /// Iterates over non-zero entries in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        (0..self.nrows).flat_map(move |i| {
            let (cols, vals) = self.row(i);
            izip!(cols, vals).map(move |(j, v)| (i, *j, v))
        })
    }
}

impl<T> CsrTensor<T>
where
    T: Clone + Zero,
{
    /// Materializes the matrix as a dense row-major buffer.
    pub fn to_dense(&self) -> Vec<T> {
        let mut dense = vec![T::zero(); self.nrows * self.ncols];
        for (i, j, v) in self.iter() {
            dense[i * self.ncols + j] = v.clone();
        }
        dense
    }
}

impl<T> CsrTensor<T>
where
    T: Clone + Zero + AddAssign + Mul<Output = T>,
{
    /// Computes `y = A x`.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != self.ncols()`.
    pub fn spmv(&self, x: &[T]) -> Vec<T> {
        assert_eq!(x.len(), self.ncols, "dimension mismatch in CSR matrix-vector product");
        let mut y = vec![T::zero(); self.nrows];
        for (i, y_i) in y.iter_mut().enumerate() {
            let (cols, vals) = self.row(i);
            let mut dot = T::zero();
            for (j, a_ij) in izip!(cols, vals) {
                dot += a_ij.clone() * x[*j].clone();
            }
            *y_i = dot;
        }
        y
    }

    /// Computes the product with a dense row-major `(ncols, k)` matrix,
    /// returning a dense row-major `(nrows, k)` buffer.
    pub fn spmm_dense(&self, other: &[T], k: usize) -> Vec<T> {
        assert_eq!(
            other.len(),
            self.ncols * k,
            "dimension mismatch in CSR matrix-matrix product"
        );
        let mut y = vec![T::zero(); self.nrows * k];
        for i in 0..self.nrows {
            let (cols, vals) = self.row(i);
            let dst = &mut y[i * k..(i + 1) * k];
            for (j, a_ij) in izip!(cols, vals) {
                let src = &other[j * k..(j + 1) * k];
                for (dst_c, src_c) in dst.iter_mut().zip(src) {
                    *dst_c += a_ij.clone() * src_c.clone();
                }
            }
        }
        y
    }

    /// Sparse-sparse product `C = A B` in CSR form.
    ///
    /// Row-by-row scatter accumulation: overlapping contributions to the same
    /// output position are summed, and output columns are sorted so the
    /// result satisfies the CSR invariants. Scratch buffers are owned by this
    /// call.
    ///
    /// # Panics
    ///
    /// Panics if `self.ncols() != rhs.nrows()`.
    pub fn spspmm(&self, rhs: &CsrTensor<T>) -> CsrTensor<T> {
        assert_eq!(
            self.ncols,
            rhs.nrows,
            "dimension mismatch in CSR sparse-sparse product"
        );

        let mut row_offsets = Vec::with_capacity(self.nrows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();

        let mut acc = vec![T::zero(); rhs.ncols];
        let mut touched = vec![false; rhs.ncols];
        let mut live_cols: Vec<usize> = Vec::new();

        row_offsets.push(0);
        for i in 0..self.nrows {
            live_cols.clear();
            let (a_cols, a_vals) = self.row(i);
            for (k, a_ik) in izip!(a_cols, a_vals) {
                let (b_cols, b_vals) = rhs.row(*k);
                for (j, b_kj) in izip!(b_cols, b_vals) {
                    if !touched[*j] {
                        touched[*j] = true;
                        acc[*j] = T::zero();
                        live_cols.push(*j);
                    }
                    acc[*j] += a_ik.clone() * b_kj.clone();
                }
            }
            live_cols.sort_unstable();
            for &j in &live_cols {
                col_indices.push(j);
                values.push(acc[j].clone());
                touched[j] = false;
            }
            row_offsets.push(col_indices.len());
        }

        CsrTensor::from_csr_data(self.nrows, rhs.ncols, row_offsets, col_indices, values)
    }
}
