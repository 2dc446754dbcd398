//! A rayon-parallel host engine.
//!
//! Shares the host tensor representation with the reference engine but
//! executes elementwise maps, full reductions, vmap slices and CSR products
//! on the rayon thread pool. Results agree with the reference engine up to
//! floating-point reassociation in reductions.

use crate::engine::{binary_host, check_sparse_operand, Engine};
use crate::error::Result;
use crate::linalg::{HostLinalg, LinalgOps};
use crate::ops::{BinaryOp, ReduceOp, UnaryOp};
use crate::random::{RandomOps, ThreadLocalRandom};
use crate::tensor::{DTensor, Tensor};
use crate::vmap::BatchedFn;
use bifrost_sparse::CsrTensor;
use rayon::prelude::*;

pub struct ParallelEngine {
    linalg: HostLinalg,
    random: ThreadLocalRandom,
}

impl ParallelEngine {
    pub fn new() -> Self {
        Self {
            linalg: HostLinalg { engine: "parallel" },
            random: ThreadLocalRandom::default(),
        }
    }
}

impl Default for ParallelEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ParallelEngine {
    fn name(&self) -> &str {
        "parallel"
    }

    fn linalg(&self) -> &dyn LinalgOps {
        &self.linalg
    }

    fn random(&self) -> &dyn RandomOps {
        &self.random
    }

    fn unary(&self, tensor: &DTensor, op: UnaryOp) -> DTensor {
        let data = tensor.data().par_iter().map(|&x| op.eval(x)).collect();
        Tensor::from_data(tensor.shape(), data)
    }

    fn binary(&self, a: &DTensor, b: &DTensor, op: BinaryOp) -> Result<DTensor> {
        if a.shape() == b.shape() {
            let data = a
                .data()
                .par_iter()
                .zip(b.data().par_iter())
                .map(|(&x, &y)| op.eval(x, y))
                .collect();
            Ok(Tensor::from_data(a.shape(), data))
        } else {
            binary_host(a, b, op)
        }
    }

    fn reduce(
        &self,
        tensor: &DTensor,
        op: ReduceOp,
        axis: Option<usize>,
        keepdims: bool,
    ) -> Result<DTensor> {
        match axis {
            // Whole-tensor reductions fold in parallel.
            None => {
                let folded = tensor
                    .data()
                    .par_iter()
                    .copied()
                    .reduce(|| op.init(), |a, b| op.fold(a, b));
                let value = op.finalize(folded, tensor.len());
                if keepdims {
                    Ok(Tensor::from_data(&vec![1; tensor.ndim()], vec![value]))
                } else {
                    Ok(Tensor::from_scalar(value))
                }
            }
            Some(_) => tensor.reduce(op, axis, keepdims),
        }
    }

    fn vmap(&self, func: BatchedFn, in_axis: usize, out_axis: usize) -> Result<BatchedFn> {
        crate::vmap::build(func, in_axis, out_axis, true)
    }

    fn csr_spmm(&self, csr: &CsrTensor<f64>, other: &DTensor) -> Result<DTensor> {
        check_sparse_operand(self.name(), "csr_spmm", csr.ncols(), other)?;
        let nrows = csr.nrows();
        match other.ndim() {
            1 => {
                let x = other.data();
                let data = (0..nrows)
                    .into_par_iter()
                    .map(|i| {
                        let (cols, vals) = csr.row(i);
                        cols.iter()
                            .zip(vals)
                            .map(|(&j, &a_ij)| a_ij * x[j])
                            .sum()
                    })
                    .collect();
                Ok(Tensor::from_data(&[nrows], data))
            }
            _ => {
                let k = other.shape()[1];
                let data = (0..nrows)
                    .into_par_iter()
                    .flat_map_iter(|i| {
                        let (cols, vals) = csr.row(i);
                        let mut row = vec![0.0; k];
                        for (&j, &a_ij) in cols.iter().zip(vals) {
                            for (dst, &src) in row.iter_mut().zip(&other.data()[j * k..(j + 1) * k])
                            {
                                *dst += a_ij * src;
                            }
                        }
                        row.into_iter()
                    })
                    .collect();
                Ok(Tensor::from_data(&[nrows, k], data))
            }
        }
    }
}
