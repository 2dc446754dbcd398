//! Dense row-major host tensors.
//!
//! `Tensor<T>` is the one concrete tensor representation shared by the
//! in-tree engines: a shape vector plus a contiguous row-major buffer.
//! Engines differ in how they *execute* operations on it, not in how the
//! data is stored, which makes host round trips loss-free by construction.

use crate::error::{Error, Result};
use crate::ops::ReduceOp;
use num::Zero;
use serde::{Deserialize, Serialize};

/// A dense tensor of arbitrary rank with row-major storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

/// The canonical dispatch scalar for the engine surface.
pub type DTensor = Tensor<f64>;

/// Index tensors (entity arrays, multi-index matrices).
pub type ITensor = Tensor<usize>;

impl<T> Tensor<T> {
    /// Builds a tensor from a shape and a row-major buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer length does not match the shape.
    pub fn from_data(shape: &[usize], data: Vec<T>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "data length must equal the product of the shape"
        );
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// A rank-0 tensor holding a single value.
    pub fn from_scalar(value: T) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        row_major_strides(&self.shape)
    }

    /// The linear offset of a multi-index.
    ///
    /// # Panics
    ///
    /// Panics if the index has the wrong rank or is out of bounds.
    pub fn flat_index(&self, index: &[usize]) -> usize {
        assert_eq!(index.len(), self.ndim(), "index rank mismatch");
        let mut offset = 0;
        for (i, (&idx, &dim)) in index.iter().zip(&self.shape).enumerate() {
            assert!(idx < dim, "index {} out of bounds for axis {}", idx, i);
            offset = offset * dim + idx;
        }
        offset
    }

    pub fn get(&self, index: &[usize]) -> &T {
        &self.data[self.flat_index(index)]
    }

    pub fn get_mut(&mut self, index: &[usize]) -> &mut T {
        let offset = self.flat_index(index);
        &mut self.data[offset]
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Tensor<U> {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Returns a tensor with the same data and a new shape of equal length.
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor<T>>
    where
        T: Clone,
    {
        if shape.iter().product::<usize>() != self.len() {
            return Err(Error::shape_mismatch(
                "reshape",
                format!("a shape with {} elements", self.len()),
                format!("{:?}", shape),
            ));
        }
        Ok(Tensor {
            shape: shape.to_vec(),
            data: self.data.clone(),
        })
    }
}

impl<T: Clone> Tensor<T> {
    pub fn full(shape: &[usize], value: T) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }
}

impl<T: Clone + Zero> Tensor<T> {
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, T::zero())
    }
}

pub(crate) fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Decomposes a shape around `axis` into `(outer, axis_len, inner)` extents
/// so that the element `(o, a, i)` lives at `o * axis_len * inner + a * inner + i`.
fn axis_extents(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer = shape[..axis].iter().product();
    let inner = shape[axis + 1..].iter().product();
    (outer, shape[axis], inner)
}

fn check_axis(op: &str, axis: usize, ndim: usize) -> Result<()> {
    if axis >= ndim {
        Err(Error::InvalidAxis {
            op: op.to_string(),
            axis,
            ndim,
        })
    } else {
        Ok(())
    }
}

impl<T: Clone> Tensor<T> {
    /// Splits the tensor into its slices along `axis`, removing that axis.
    pub fn unstack(&self, axis: usize) -> Result<Vec<Tensor<T>>> {
        check_axis("unstack", axis, self.ndim())?;
        let (outer, len, inner) = axis_extents(&self.shape, axis);
        let mut slice_shape = self.shape.clone();
        slice_shape.remove(axis);

        let mut slices = Vec::with_capacity(len);
        for a in 0..len {
            let mut data = Vec::with_capacity(outer * inner);
            for o in 0..outer {
                let begin = (o * len + a) * inner;
                data.extend_from_slice(&self.data[begin..begin + inner]);
            }
            slices.push(Tensor {
                shape: slice_shape.clone(),
                data,
            });
        }
        Ok(slices)
    }

    /// Stacks equally shaped tensors along a new axis at position `axis`.
    pub fn stack(parts: &[Tensor<T>], axis: usize) -> Result<Tensor<T>> {
        let first = parts.first().ok_or_else(|| {
            Error::shape_mismatch("stack", "at least one tensor", "an empty sequence")
        })?;
        check_axis("stack", axis, first.ndim() + 1)?;
        if parts.iter().any(|t| t.shape() != first.shape()) {
            return Err(Error::shape_mismatch(
                "stack",
                format!("all operands of shape {:?}", first.shape()),
                "tensors of differing shapes",
            ));
        }

        let mut shape = first.shape.clone();
        shape.insert(axis, parts.len());
        let (outer, len, inner) = axis_extents(&shape, axis);

        let mut data = Vec::with_capacity(outer * len * inner);
        for o in 0..outer {
            for part in parts {
                data.extend_from_slice(&part.data[o * inner..(o + 1) * inner]);
            }
        }
        Ok(Tensor { shape, data })
    }

    /// Concatenates tensors along an existing axis.
    pub fn concat(parts: &[Tensor<T>], axis: usize) -> Result<Tensor<T>> {
        let first = parts.first().ok_or_else(|| {
            Error::shape_mismatch("concat", "at least one tensor", "an empty sequence")
        })?;
        check_axis("concat", axis, first.ndim())?;
        for part in parts {
            let compatible = part.ndim() == first.ndim()
                && part
                    .shape()
                    .iter()
                    .zip(first.shape())
                    .enumerate()
                    .all(|(i, (a, b))| i == axis || a == b);
            if !compatible {
                return Err(Error::shape_mismatch(
                    "concat",
                    format!("shapes equal to {:?} except along axis {}", first.shape(), axis),
                    format!("{:?}", part.shape()),
                ));
            }
        }

        let mut shape = first.shape.clone();
        shape[axis] = parts.iter().map(|p| p.shape[axis]).sum();
        let (outer, _, inner) = axis_extents(&shape, axis);

        let mut data = Vec::with_capacity(shape.iter().product());
        for o in 0..outer {
            for part in parts {
                let len = part.shape[axis];
                data.extend_from_slice(&part.data[o * len * inner..(o + 1) * len * inner]);
            }
        }
        Ok(Tensor { shape, data })
    }

    /// Reverses the order of elements along `axis`.
    pub fn flip(&self, axis: usize) -> Result<Tensor<T>> {
        check_axis("flip", axis, self.ndim())?;
        let (outer, len, inner) = axis_extents(&self.shape, axis);
        let mut data = Vec::with_capacity(self.len());
        for o in 0..outer {
            for a in (0..len).rev() {
                let begin = (o * len + a) * inner;
                data.extend_from_slice(&self.data[begin..begin + inner]);
            }
        }
        Ok(Tensor {
            shape: self.shape.clone(),
            data,
        })
    }

    /// Exchanges two axes.
    pub fn swap_axes(&self, a: usize, b: usize) -> Result<Tensor<T>> {
        check_axis("swap_axes", a, self.ndim())?;
        check_axis("swap_axes", b, self.ndim())?;
        if a == b {
            return Ok(self.clone());
        }

        let mut shape = self.shape.clone();
        shape.swap(a, b);
        let old_strides = self.strides();

        // Walk the output in row-major order and gather from the source.
        let mut data = Vec::with_capacity(self.len());
        let mut index = vec![0usize; shape.len()];
        if !self.is_empty() {
            loop {
                let mut src_offset = 0;
                for (dim, &idx) in index.iter().enumerate() {
                    let src_dim = if dim == a {
                        b
                    } else if dim == b {
                        a
                    } else {
                        dim
                    };
                    src_offset += idx * old_strides[src_dim];
                }
                data.push(self.data[src_offset].clone());
                if !increment_index(&mut index, &shape) {
                    break;
                }
            }
        }
        Ok(Tensor { shape, data })
    }
}

/// Advances a row-major odometer index; wraps to all zeros at the end.
pub(crate) fn increment_index(index: &mut [usize], shape: &[usize]) -> bool {
    for axis in (0..shape.len()).rev() {
        index[axis] += 1;
        if index[axis] < shape[axis] {
            return true;
        }
        index[axis] = 0;
    }
    false
}

impl DTensor {
    /// Reduces along `axis` (or over all elements when `axis` is `None`).
    pub fn reduce(&self, op: ReduceOp, axis: Option<usize>, keepdims: bool) -> Result<DTensor> {
        match axis {
            None => {
                let value = op.finalize(
                    self.data.iter().copied().fold(op.init(), |acc, x| op.fold(acc, x)),
                    self.len(),
                );
                if keepdims {
                    Ok(Tensor::from_data(&vec![1; self.ndim()], vec![value]))
                } else {
                    Ok(Tensor::from_scalar(value))
                }
            }
            Some(axis) => {
                check_axis(op.name(), axis, self.ndim())?;
                let (outer, len, inner) = axis_extents(&self.shape, axis);
                let mut data = vec![op.init(); outer * inner];
                for o in 0..outer {
                    for a in 0..len {
                        for i in 0..inner {
                            let acc = &mut data[o * inner + i];
                            *acc = op.fold(*acc, self.data[(o * len + a) * inner + i]);
                        }
                    }
                }
                for value in &mut data {
                    *value = op.finalize(*value, len);
                }
                let mut shape = self.shape.clone();
                if keepdims {
                    shape[axis] = 1;
                } else {
                    shape.remove(axis);
                }
                Ok(Tensor { shape, data })
            }
        }
    }

    /// Cumulative scan along `axis` with the given combiner.
    pub(crate) fn scan_axis(&self, axis: usize, op_name: &str, f: impl Fn(f64, f64) -> f64) -> Result<DTensor> {
        check_axis(op_name, axis, self.ndim())?;
        let (outer, len, inner) = axis_extents(&self.shape, axis);
        let mut data = self.data.clone();
        for o in 0..outer {
            for a in 1..len {
                for i in 0..inner {
                    let prev = data[(o * len + a - 1) * inner + i];
                    let cur = &mut data[(o * len + a) * inner + i];
                    *cur = f(prev, *cur);
                }
            }
        }
        Ok(Tensor {
            shape: self.shape.clone(),
            data,
        })
    }

    /// Index of the extremal element along `axis`. `largest` picks argmax.
    pub(crate) fn arg_extremum(&self, axis: usize, largest: bool) -> Result<ITensor> {
        let op_name = if largest { "argmax" } else { "argmin" };
        check_axis(op_name, axis, self.ndim())?;
        let (outer, len, inner) = axis_extents(&self.shape, axis);
        assert!(len > 0, "cannot reduce over an empty axis");
        let mut data = vec![0usize; outer * inner];
        for o in 0..outer {
            for i in 0..inner {
                let mut best = 0;
                let mut best_val = self.data[o * len * inner + i];
                for a in 1..len {
                    let val = self.data[(o * len + a) * inner + i];
                    if (largest && val > best_val) || (!largest && val < best_val) {
                        best = a;
                        best_val = val;
                    }
                }
                data[o * inner + i] = best;
            }
        }
        let mut shape = self.shape.clone();
        shape.remove(axis);
        Ok(Tensor { shape, data })
    }
}
