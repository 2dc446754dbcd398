use crate::CsrTensor;
use itertools::izip;
use num::Zero;
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Mul};

/// A sparse matrix in coordinate (triplet) format.
///
/// Indices need not be sorted, and the same `(row, col)` pair may occur more
/// than once; duplicates are summed on conversion to CSR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooTensor<T> {
    nrows: usize,
    ncols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<T>,
}

impl<T> CooTensor<T> {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds a COO matrix from raw triplet arrays.
    ///
    /// # Panics
    ///
    /// Panics if the arrays have different lengths or any index is out of
    /// bounds.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        assert_eq!(rows.len(), cols.len(), "row/col arrays must have equal length");
        assert_eq!(cols.len(), values.len(), "col/value arrays must have equal length");
        assert!(rows.iter().all(|&i| i < nrows), "row index out of bounds");
        assert!(cols.iter().all(|&j| j < ncols), "col index out of bounds");
        Self {
            nrows,
            ncols,
            rows,
            cols,
            values,
        }
    }

    #[inline(always)]
    pub fn push(&mut self, i: usize, j: usize, v: T) {
        assert!(i < self.nrows);
        assert!(j < self.ncols);
        self.rows.push(i);
        self.cols.push(j);
        self.values.push(v);
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

    pub fn row_indices(&self) -> &[usize] {
        &self.rows
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.cols
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Iterates over the stored triplets in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        izip!(&self.rows, &self.cols, &self.values).map(|(i, j, v)| (*i, *j, v))
    }
}

impl<T> CooTensor<T>
where
    T: Clone + Zero + AddAssign,
{
    /// Materializes the matrix as a dense row-major buffer, summing
    /// duplicate entries.
    pub fn to_dense(&self) -> Vec<T> {
        let mut dense = vec![T::zero(); self.nrows * self.ncols];
        for (i, j, v) in self.iter() {
            dense[i * self.ncols + j] += v.clone();
        }
        dense
    }

    /// Converts to CSR format.
    ///
    /// Entries sharing a `(row, col)` pair are summed into a single CSR
    /// entry, and column indices are sorted within each row.
    pub fn to_csr(&self) -> CsrTensor<T> {
        // Bucket the triplets by row with a counting pass, leaving the
        // columns within each row unsorted.
        let mut offsets = vec![0usize; self.nrows + 1];
        for &i in &self.rows {
            offsets[i + 1] += 1;
        }
        for i in 0..self.nrows {
            offsets[i + 1] += offsets[i];
        }

        let mut bucket_cols = vec![0usize; self.nnz()];
        let mut bucket_vals = vec![T::zero(); self.nnz()];
        let mut cursor = offsets.clone();
        for (i, j, v) in self.iter() {
            let dst = cursor[i];
            bucket_cols[dst] = j;
            bucket_vals[dst] = v.clone();
            cursor[i] += 1;
        }

        // Per-row: sort by column, then merge duplicates by summation. The
        // scratch vector is reused across rows within this call only.
        let mut row_offsets = Vec::with_capacity(self.nrows + 1);
        let mut col_indices = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());
        let mut scratch: Vec<(usize, T)> = Vec::new();

        row_offsets.push(0);
        for i in 0..self.nrows {
            let begin = offsets[i];
            let end = offsets[i + 1];

            scratch.clear();
            scratch.extend(
                izip!(&bucket_cols[begin..end], &bucket_vals[begin..end])
                    .map(|(j, v)| (*j, v.clone())),
            );
            scratch.sort_unstable_by_key(|(j, _)| *j);

            let row_start = col_indices.len();
            for (j, v) in scratch.drain(..) {
                if col_indices.len() > row_start && *col_indices.last().unwrap() == j {
                    *values.last_mut().unwrap() += v;
                } else {
                    col_indices.push(j);
                    values.push(v);
                }
            }
            row_offsets.push(col_indices.len());
        }

        CsrTensor::from_csr_data(self.nrows, self.ncols, row_offsets, col_indices, values)
    }
}

impl<T> CooTensor<T>
where
    T: Clone + Zero + AddAssign + Mul<Output = T>,
{
    /// Computes `y = A x` by direct accumulation over the stored triplets.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != self.ncols()`.
    pub fn spmv(&self, x: &[T]) -> Vec<T> {
        assert_eq!(x.len(), self.ncols, "dimension mismatch in COO matrix-vector product");
        let mut y = vec![T::zero(); self.nrows];
        for (i, j, v) in self.iter() {
            y[i] += v.clone() * x[j].clone();
        }
        y
    }

    /// Computes the product with a dense row-major `(ncols, k)` matrix,
    /// returning a dense row-major `(nrows, k)` buffer.
    pub fn spmm_dense(&self, other: &[T], k: usize) -> Vec<T> {
        assert_eq!(
            other.len(),
            self.ncols * k,
            "dimension mismatch in COO matrix-matrix product"
        );
        let mut y = vec![T::zero(); self.nrows * k];
        for (i, j, v) in self.iter() {
            let src = &other[j * k..(j + 1) * k];
            let dst = &mut y[i * k..(i + 1) * k];
            for (dst_c, src_c) in dst.iter_mut().zip(src) {
                *dst_c += v.clone() * src_c.clone();
            }
        }
        y
    }
}
