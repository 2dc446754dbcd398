//! The engine abstraction: one trait, the full canonical operation surface.
//!
//! Every operation consumed by finite-element code is a method here.
//! Default implementations provide the sequential host semantics, so an
//! engine adapter only overrides what it can execute natively; the surface
//! itself is total. Operations an engine genuinely cannot provide must
//! return [`Error::UnsupportedOperation`], never silently approximate.

use crate::device::{Device, DeviceType};
use crate::error::{Error, Result};
use crate::fem;
use crate::linalg::LinalgOps;
use crate::ops::{BinaryOp, ReduceOp, UnaryOp};
use crate::random::RandomOps;
use crate::tensor::{DTensor, ITensor, Tensor};
use bifrost_sparse::{CooTensor, CsrTensor};

pub mod cpu;
pub mod nalgebra;
pub mod parallel;

pub use self::cpu::CpuEngine;
pub use self::nalgebra::NalgebraEngine;
pub use self::parallel::ParallelEngine;
pub use crate::vmap::BatchedFn;

/// A tensor-computation engine.
///
/// Engines are registered by name and selected per thread; see
/// [`crate::registry`]. All methods are synchronous: engines with deferred
/// execution must materialize results before returning.
pub trait Engine: Send + Sync {
    /// The unique name this engine is registered under.
    fn name(&self) -> &str;

    // ---- devices ----

    fn default_device(&self) -> Device {
        Device::cpu()
    }

    fn device_type(&self, _tensor: &DTensor) -> DeviceType {
        DeviceType::Cpu
    }

    fn device_index(&self, _tensor: &DTensor) -> usize {
        0
    }

    fn get_device(&self, _tensor: &DTensor) -> Device {
        Device::cpu()
    }

    /// Validates a requested device. Host engines accept `None` or a cpu
    /// device and reject everything else.
    fn check_device(&self, device: Option<&Device>) -> Result<()> {
        match device {
            None => Ok(()),
            Some(device) if device.is_host() => Ok(()),
            Some(device) => Err(Error::UnsupportedDevice {
                engine: self.name().to_string(),
                device: *device,
            }),
        }
    }

    fn device_put(&self, tensor: DTensor, device: Option<&Device>) -> Result<DTensor> {
        self.check_device(device)?;
        Ok(tensor)
    }

    fn set_default_device(&self, _device: &Device) -> Result<()> {
        Err(Error::unsupported_op(self.name(), "set_default_device"))
    }

    // ---- creation ----

    fn zeros(&self, shape: &[usize], device: Option<&Device>) -> Result<DTensor> {
        self.check_device(device)?;
        Ok(Tensor::zeros(shape))
    }

    fn ones(&self, shape: &[usize], device: Option<&Device>) -> Result<DTensor> {
        self.full(shape, 1.0, device)
    }

    fn full(&self, shape: &[usize], fill_value: f64, device: Option<&Device>) -> Result<DTensor> {
        self.check_device(device)?;
        Ok(Tensor::full(shape, fill_value))
    }

    /// Allocates without meaningful contents. The host representation
    /// zero-initializes.
    fn empty(&self, shape: &[usize], device: Option<&Device>) -> Result<DTensor> {
        self.zeros(shape, device)
    }

    fn eye(&self, n: usize, device: Option<&Device>) -> Result<DTensor> {
        self.check_device(device)?;
        let mut out = Tensor::zeros(&[n, n]);
        for i in 0..n {
            out.data_mut()[i * n + i] = 1.0;
        }
        Ok(out)
    }

    fn arange(&self, start: f64, stop: f64, step: f64, device: Option<&Device>) -> Result<DTensor> {
        self.check_device(device)?;
        if step == 0.0 {
            return Err(Error::shape_mismatch("arange", "a non-zero step", "0"));
        }
        let count = ((stop - start) / step).ceil().max(0.0) as usize;
        let data = (0..count).map(|i| start + step * i as f64).collect();
        Ok(Tensor::from_data(&[count], data))
    }

    fn linspace(&self, start: f64, stop: f64, num: usize, device: Option<&Device>) -> Result<DTensor> {
        self.check_device(device)?;
        let data = match num {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (stop - start) / (num - 1) as f64;
                (0..num).map(|i| start + step * i as f64).collect()
            }
        };
        Ok(Tensor::from_data(&[num], data))
    }

    // ---- conversion ----

    /// Copies the tensor into host representation. For host engines this is
    /// the identity up to a copy, so round trips are loss-free.
    fn to_host(&self, tensor: &DTensor) -> DTensor {
        tensor.clone()
    }

    fn from_host(&self, host: DTensor, device: Option<&Device>) -> Result<DTensor> {
        self.check_device(device)?;
        Ok(host)
    }

    // ---- elementwise ----

    fn unary(&self, tensor: &DTensor, op: UnaryOp) -> DTensor {
        tensor.map(|&x| op.eval(x))
    }

    /// Elementwise binary operation over equal shapes, or against a
    /// single-element operand on either side.
    fn binary(&self, a: &DTensor, b: &DTensor, op: BinaryOp) -> Result<DTensor> {
        binary_host(a, b, op)
    }

    // ---- reductions, scans, searching ----

    fn reduce(
        &self,
        tensor: &DTensor,
        op: ReduceOp,
        axis: Option<usize>,
        keepdims: bool,
    ) -> Result<DTensor> {
        tensor.reduce(op, axis, keepdims)
    }

    fn cumsum(&self, tensor: &DTensor, axis: usize) -> Result<DTensor> {
        tensor.scan_axis(axis, "cumsum", |a, b| a + b)
    }

    fn cumprod(&self, tensor: &DTensor, axis: usize) -> Result<DTensor> {
        tensor.scan_axis(axis, "cumprod", |a, b| a * b)
    }

    fn argmax(&self, tensor: &DTensor, axis: usize) -> Result<ITensor> {
        tensor.arg_extremum(axis, true)
    }

    fn argmin(&self, tensor: &DTensor, axis: usize) -> Result<ITensor> {
        tensor.arg_extremum(axis, false)
    }

    // ---- manipulation ----

    fn reshape(&self, tensor: &DTensor, shape: &[usize]) -> Result<DTensor> {
        tensor.reshape(shape)
    }

    fn concat(&self, parts: &[DTensor], axis: usize) -> Result<DTensor> {
        Tensor::concat(parts, axis)
    }

    fn stack(&self, parts: &[DTensor], axis: usize) -> Result<DTensor> {
        Tensor::stack(parts, axis)
    }

    fn unstack(&self, tensor: &DTensor, axis: usize) -> Result<Vec<DTensor>> {
        tensor.unstack(axis)
    }

    fn flip(&self, tensor: &DTensor, axis: usize) -> Result<DTensor> {
        tensor.flip(axis)
    }

    fn swap_axes(&self, tensor: &DTensor, a: usize, b: usize) -> Result<DTensor> {
        tensor.swap_axes(a, b)
    }

    // ---- grouped namespaces ----

    fn linalg(&self) -> &dyn LinalgOps;

    fn random(&self) -> &dyn RandomOps;

    // ---- contraction ----

    fn einsum(&self, spec: &str, operands: &[&DTensor]) -> Result<DTensor> {
        crate::einsum::einsum(spec, operands)
    }

    // ---- function transforms ----

    /// Returns the vectorized form of `func`; see [`crate::vmap::build`].
    fn vmap(&self, func: BatchedFn, in_axis: usize, out_axis: usize) -> Result<BatchedFn> {
        crate::vmap::build(func, in_axis, out_axis, false)
    }

    // ---- sparse ----

    fn coo_to_csr(&self, coo: &CooTensor<f64>) -> Result<CsrTensor<f64>> {
        Ok(coo.to_csr())
    }

    fn coo_spmm(&self, coo: &CooTensor<f64>, other: &DTensor) -> Result<DTensor> {
        check_sparse_operand(self.name(), "coo_spmm", coo.ncols(), other)?;
        match other.ndim() {
            1 => Ok(Tensor::from_data(&[coo.nrows()], coo.spmv(other.data()))),
            _ => {
                let k = other.shape()[1];
                Ok(Tensor::from_data(
                    &[coo.nrows(), k],
                    coo.spmm_dense(other.data(), k),
                ))
            }
        }
    }

    fn csr_spmm(&self, csr: &CsrTensor<f64>, other: &DTensor) -> Result<DTensor> {
        check_sparse_operand(self.name(), "csr_spmm", csr.ncols(), other)?;
        match other.ndim() {
            1 => Ok(Tensor::from_data(&[csr.nrows()], csr.spmv(other.data()))),
            _ => {
                let k = other.shape()[1];
                Ok(Tensor::from_data(
                    &[csr.nrows(), k],
                    csr.spmm_dense(other.data(), k),
                ))
            }
        }
    }

    fn csr_spspmm(&self, a: &CsrTensor<f64>, b: &CsrTensor<f64>) -> Result<CsrTensor<f64>> {
        if a.ncols() != b.nrows() {
            return Err(Error::shape_mismatch(
                "csr_spspmm",
                format!("a right operand with {} rows", a.ncols()),
                format!("({}, {})", b.nrows(), b.ncols()),
            ));
        }
        Ok(a.spspmm(b))
    }

    // ---- finite-element kernels ----

    fn multi_index_matrix(&self, p: usize, td: usize) -> ITensor {
        fem::multi_index_matrix(p, td)
    }

    fn simplex_shape_function(
        &self,
        bc: &DTensor,
        p: usize,
        mi: Option<&ITensor>,
    ) -> Result<DTensor> {
        fem::simplex_shape_function(bc, p, mi)
    }

    fn simplex_grad_shape_function(
        &self,
        bc: &DTensor,
        p: usize,
        mi: Option<&ITensor>,
    ) -> Result<DTensor> {
        fem::simplex_grad_shape_function(bc, p, mi)
    }

    fn simplex_measure(&self, entity: &ITensor, node: &DTensor) -> Result<DTensor> {
        fem::simplex_measure(entity, node)
    }

    fn edge_length(&self, edge: &ITensor, node: &DTensor) -> Result<DTensor> {
        fem::edge_length(edge, node)
    }

    fn edge_normal(&self, edge: &ITensor, node: &DTensor, unit: bool) -> Result<DTensor> {
        fem::edge_normal(edge, node, unit)
    }

    fn edge_tangent(&self, edge: &ITensor, node: &DTensor, unit: bool) -> Result<DTensor> {
        fem::edge_tangent(edge, node, unit)
    }

    fn triangle_area_3d(&self, tri: &ITensor, node: &DTensor) -> Result<DTensor> {
        fem::triangle_area_3d(tri, node)
    }

    fn interval_grad_lambda(&self, line: &ITensor, node: &DTensor) -> Result<DTensor> {
        fem::interval_grad_lambda(line, node)
    }

    fn triangle_grad_lambda_2d(&self, tri: &ITensor, node: &DTensor) -> Result<DTensor> {
        fem::triangle_grad_lambda_2d(tri, node)
    }

    fn triangle_grad_lambda_3d(&self, tri: &ITensor, node: &DTensor) -> Result<DTensor> {
        fem::triangle_grad_lambda_3d(tri, node)
    }

    fn tetrahedron_grad_lambda_3d(
        &self,
        tet: &ITensor,
        node: &DTensor,
        local_face: Option<&ITensor>,
    ) -> Result<DTensor> {
        fem::tetrahedron_grad_lambda_3d(tet, node, local_face)
    }

    fn barycenter(&self, entity: &ITensor, node: &DTensor) -> Result<DTensor> {
        fem::barycenter(entity, node)
    }

    /// Maps barycentric points to physical points, shape
    /// `(NE, ..., GD)` for `bc` of shape `(..., NVC)`.
    fn bc_to_points(&self, bc: &DTensor, node: &DTensor, entity: &ITensor) -> Result<DTensor> {
        let points = fem::gather_entity_points(entity, node)?;
        let nvc = match bc.shape().last() {
            Some(&nvc) if nvc == points.shape()[1] => nvc,
            _ => {
                return Err(Error::shape_mismatch(
                    "bc_to_points",
                    format!("barycentric points of shape (..., {})", points.shape()[1]),
                    format!("{:?}", bc.shape()),
                ))
            }
        };
        let flat_bc = bc.reshape(&[bc.len() / nvc, nvc])?;
        let result = self.einsum("ejd,qj->eqd", &[&points, &flat_bc])?;

        let mut out_shape = vec![points.shape()[0]];
        out_shape.extend_from_slice(&bc.shape()[..bc.ndim() - 1]);
        out_shape.push(points.shape()[2]);
        result.reshape(&out_shape)
    }
}

/// Shared host implementation of [`Engine::binary`].
pub(crate) fn binary_host(a: &DTensor, b: &DTensor, op: BinaryOp) -> Result<DTensor> {
    if a.shape() == b.shape() {
        let data = a
            .data()
            .iter()
            .zip(b.data())
            .map(|(&x, &y)| op.eval(x, y))
            .collect();
        Ok(Tensor::from_data(a.shape(), data))
    } else if b.len() == 1 {
        let y = b.data()[0];
        Ok(a.map(|&x| op.eval(x, y)))
    } else if a.len() == 1 {
        let x = a.data()[0];
        Ok(b.map(|&y| op.eval(x, y)))
    } else {
        Err(Error::shape_mismatch(
            op.name(),
            format!("{:?}", a.shape()),
            format!("{:?}", b.shape()),
        ))
    }
}

/// Validates the dense operand of a sparse product: rank 1 or 2 with a
/// matching leading dimension. Batched (rank ≥ 3) operands are unsupported
/// by every in-tree engine.
pub(crate) fn check_sparse_operand(
    engine: &str,
    op: &str,
    ncols: usize,
    other: &DTensor,
) -> Result<()> {
    match other.ndim() {
        0 => Err(Error::shape_mismatch(
            op,
            "a rank-1 or rank-2 dense operand",
            "a rank-0 tensor",
        )),
        1 | 2 => {
            if other.shape()[0] == ncols {
                Ok(())
            } else {
                Err(Error::shape_mismatch(
                    op,
                    format!("a dense operand with {ncols} rows"),
                    format!("{:?}", other.shape()),
                ))
            }
        }
        ndim => Err(Error::unsupported_op(
            engine,
            format!("{op} with a rank-{ndim} dense operand (batched sparse products)"),
        )),
    }
}
