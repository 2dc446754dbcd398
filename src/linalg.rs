//! The `linalg` grouped namespace.

use crate::error::{Error, Result};
use crate::tensor::{DTensor, Tensor};
use itertools::izip;

pub trait LinalgOps: Send + Sync {
    /// Matrix product of a `(m, k)` matrix with a `(k, n)` matrix or a
    /// `(k,)` vector.
    fn matmul(&self, a: &DTensor, b: &DTensor) -> Result<DTensor>;

    /// Determinants of a batch of square matrices, shape `(..., n, n)` to
    /// `(...)`.
    fn det(&self, t: &DTensor) -> Result<DTensor>;

    /// Euclidean norm along `axis`, or of the whole tensor when `axis` is
    /// `None`.
    fn vector_norm(&self, t: &DTensor, axis: Option<usize>) -> Result<DTensor>;

    /// Cross product along the last axis: 3-vectors yield 3-vectors,
    /// 2-vectors yield the scalar out-of-plane component.
    fn cross(&self, a: &DTensor, b: &DTensor) -> Result<DTensor>;

    /// Inner product of two equal-length vectors.
    fn dot(&self, a: &DTensor, b: &DTensor) -> Result<DTensor>;
}

/// Reference implementation in terms of explicit loops, shared by the host
/// engines.
pub(crate) struct HostLinalg {
    pub(crate) engine: &'static str,
}

impl LinalgOps for HostLinalg {
    fn matmul(&self, a: &DTensor, b: &DTensor) -> Result<DTensor> {
        let (m, k) = match a.shape() {
            [m, k] => (*m, *k),
            _ => {
                return Err(Error::shape_mismatch(
                    "matmul",
                    "a rank-2 left operand",
                    format!("{:?}", a.shape()),
                ))
            }
        };
        let (n, vector_rhs) = match b.shape() {
            [rows, n] if *rows == k => (*n, false),
            [rows] if *rows == k => (1, true),
            _ => {
                return Err(Error::shape_mismatch(
                    "matmul",
                    format!("a right operand with {k} rows"),
                    format!("{:?}", b.shape()),
                ))
            }
        };

        let mut data = vec![0.0; m * n];
        for i in 0..m {
            for l in 0..k {
                let a_il = a.data()[i * k + l];
                for j in 0..n {
                    data[i * n + j] += a_il * b.data()[l * n + j];
                }
            }
        }
        let shape: &[usize] = if vector_rhs { &[m] } else { &[m, n] };
        Ok(Tensor::from_data(shape, data))
    }

    fn det(&self, t: &DTensor) -> Result<DTensor> {
        let (batch_shape, n) = square_batch_shape(t)?;
        if n > 3 {
            // The reference engine only carries the closed forms the FEM
            // kernels need.
            return Err(Error::unsupported_op(
                self.engine,
                format!("det for {n}x{n} matrices"),
            ));
        }
        let data = t
            .data()
            .chunks(n * n)
            .map(|m| match n {
                1 => m[0],
                2 => m[0] * m[3] - m[1] * m[2],
                _ => {
                    m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
                        + m[2] * (m[3] * m[7] - m[4] * m[6])
                }
            })
            .collect();
        Ok(Tensor::from_data(&batch_shape, data))
    }

    fn vector_norm(&self, t: &DTensor, axis: Option<usize>) -> Result<DTensor> {
        let squared = t.map(|x| x * x);
        let sum = squared.reduce(crate::ops::ReduceOp::Sum, axis, false)?;
        Ok(sum.map(|x| x.sqrt()))
    }

    fn cross(&self, a: &DTensor, b: &DTensor) -> Result<DTensor> {
        if a.shape() != b.shape() {
            return Err(Error::shape_mismatch(
                "cross",
                format!("{:?}", a.shape()),
                format!("{:?}", b.shape()),
            ));
        }
        match a.shape().last() {
            Some(3) => {
                let mut data = Vec::with_capacity(a.len());
                for (u, v) in izip!(a.data().chunks(3), b.data().chunks(3)) {
                    data.push(u[1] * v[2] - u[2] * v[1]);
                    data.push(u[2] * v[0] - u[0] * v[2]);
                    data.push(u[0] * v[1] - u[1] * v[0]);
                }
                Ok(Tensor::from_data(a.shape(), data))
            }
            Some(2) => {
                let data = izip!(a.data().chunks(2), b.data().chunks(2))
                    .map(|(u, v)| u[0] * v[1] - u[1] * v[0])
                    .collect();
                Ok(Tensor::from_data(
                    &a.shape()[..a.ndim() - 1],
                    data,
                ))
            }
            _ => Err(Error::shape_mismatch(
                "cross",
                "operands with a last axis of extent 2 or 3",
                format!("{:?}", a.shape()),
            )),
        }
    }

    fn dot(&self, a: &DTensor, b: &DTensor) -> Result<DTensor> {
        if a.ndim() != 1 || a.shape() != b.shape() {
            return Err(Error::shape_mismatch(
                "dot",
                "two vectors of equal length",
                format!("{:?} and {:?}", a.shape(), b.shape()),
            ));
        }
        let value = izip!(a.data(), b.data()).map(|(x, y)| x * y).sum();
        Ok(Tensor::from_scalar(value))
    }
}

/// Validates a `(..., n, n)` shape and returns `(batch_shape, n)`.
pub(crate) fn square_batch_shape(t: &DTensor) -> Result<(Vec<usize>, usize)> {
    match t.shape() {
        [rest @ .., n, m] if n == m && *n > 0 => Ok((rest.to_vec(), *n)),
        _ => Err(Error::shape_mismatch(
            "det",
            "a tensor of square matrices (..., n, n)",
            format!("{:?}", t.shape()),
        )),
    }
}
