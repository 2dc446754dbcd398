//! The canonical operation surface as free functions.
//!
//! Every function resolves the calling thread's active engine and forwards
//! to it, so finite-element code can be written once against this module
//! and run unmodified on any registered engine. The grouped `linalg` and
//! `random` namespaces are exposed as submodules of the same kind.

use crate::device::Device;
use crate::engine::{BatchedFn, Engine};
use crate::error::Result;
use crate::linalg::LinalgOps;
use crate::ops::{BinaryOp, ReduceOp, UnaryOp};
use crate::random::RandomOps;
use crate::registry::active_engine;
use crate::tensor::{DTensor, ITensor};
use bifrost_sparse::{CooTensor, CsrTensor};

// ---- engine selection ----

pub use crate::registry::{select_engine, with_engine, ScopedEngine};

// ---- creation ----

pub fn zeros(shape: &[usize], device: Option<&Device>) -> Result<DTensor> {
    active_engine().zeros(shape, device)
}

pub fn ones(shape: &[usize], device: Option<&Device>) -> Result<DTensor> {
    active_engine().ones(shape, device)
}

pub fn full(shape: &[usize], fill_value: f64, device: Option<&Device>) -> Result<DTensor> {
    active_engine().full(shape, fill_value, device)
}

pub fn empty(shape: &[usize], device: Option<&Device>) -> Result<DTensor> {
    active_engine().empty(shape, device)
}

pub fn eye(n: usize, device: Option<&Device>) -> Result<DTensor> {
    active_engine().eye(n, device)
}

pub fn arange(start: f64, stop: f64, step: f64, device: Option<&Device>) -> Result<DTensor> {
    active_engine().arange(start, stop, step, device)
}

pub fn linspace(start: f64, stop: f64, num: usize, device: Option<&Device>) -> Result<DTensor> {
    active_engine().linspace(start, stop, num, device)
}

// ---- conversion ----

pub fn to_host_array(tensor: &DTensor) -> DTensor {
    active_engine().to_host(tensor)
}

pub fn from_host_array(host: DTensor, device: Option<&Device>) -> Result<DTensor> {
    active_engine().from_host(host, device)
}

pub fn device_put(tensor: DTensor, device: Option<&Device>) -> Result<DTensor> {
    active_engine().device_put(tensor, device)
}

// ---- elementwise ----

macro_rules! unary_fns {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(pub fn $name(tensor: &DTensor) -> DTensor {
            active_engine().unary(tensor, UnaryOp::$op)
        })*
    };
}

macro_rules! binary_fns {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(pub fn $name(a: &DTensor, b: &DTensor) -> Result<DTensor> {
            active_engine().binary(a, b, BinaryOp::$op)
        })*
    };
}

unary_fns! {
    neg => Neg,
    abs => Abs,
    sign => Sign,
    sqrt => Sqrt,
    exp => Exp,
    log => Log,
    sin => Sin,
    cos => Cos,
    tanh => Tanh,
    floor => Floor,
    ceil => Ceil,
}

binary_fns! {
    add => Add,
    sub => Sub,
    mul => Mul,
    div => Div,
    pow => Pow,
    maximum => Maximum,
    minimum => Minimum,
}

// ---- reductions, scans, searching ----

pub fn sum(tensor: &DTensor, axis: Option<usize>, keepdims: bool) -> Result<DTensor> {
    active_engine().reduce(tensor, ReduceOp::Sum, axis, keepdims)
}

pub fn prod(tensor: &DTensor, axis: Option<usize>, keepdims: bool) -> Result<DTensor> {
    active_engine().reduce(tensor, ReduceOp::Prod, axis, keepdims)
}

pub fn mean(tensor: &DTensor, axis: Option<usize>, keepdims: bool) -> Result<DTensor> {
    active_engine().reduce(tensor, ReduceOp::Mean, axis, keepdims)
}

pub fn max(tensor: &DTensor, axis: Option<usize>, keepdims: bool) -> Result<DTensor> {
    active_engine().reduce(tensor, ReduceOp::Max, axis, keepdims)
}

pub fn min(tensor: &DTensor, axis: Option<usize>, keepdims: bool) -> Result<DTensor> {
    active_engine().reduce(tensor, ReduceOp::Min, axis, keepdims)
}

pub fn cumsum(tensor: &DTensor, axis: usize) -> Result<DTensor> {
    active_engine().cumsum(tensor, axis)
}

pub fn cumprod(tensor: &DTensor, axis: usize) -> Result<DTensor> {
    active_engine().cumprod(tensor, axis)
}

pub fn argmax(tensor: &DTensor, axis: usize) -> Result<ITensor> {
    active_engine().argmax(tensor, axis)
}

pub fn argmin(tensor: &DTensor, axis: usize) -> Result<ITensor> {
    active_engine().argmin(tensor, axis)
}

// ---- manipulation ----

pub fn reshape(tensor: &DTensor, shape: &[usize]) -> Result<DTensor> {
    active_engine().reshape(tensor, shape)
}

pub fn concat(parts: &[DTensor], axis: usize) -> Result<DTensor> {
    active_engine().concat(parts, axis)
}

pub fn stack(parts: &[DTensor], axis: usize) -> Result<DTensor> {
    active_engine().stack(parts, axis)
}

pub fn unstack(tensor: &DTensor, axis: usize) -> Result<Vec<DTensor>> {
    active_engine().unstack(tensor, axis)
}

pub fn flip(tensor: &DTensor, axis: usize) -> Result<DTensor> {
    active_engine().flip(tensor, axis)
}

pub fn swap_axes(tensor: &DTensor, a: usize, b: usize) -> Result<DTensor> {
    active_engine().swap_axes(tensor, a, b)
}

// ---- contraction and transforms ----

pub fn einsum(spec: &str, operands: &[&DTensor]) -> Result<DTensor> {
    active_engine().einsum(spec, operands)
}

pub fn vmap(func: BatchedFn, in_axis: usize, out_axis: usize) -> Result<BatchedFn> {
    active_engine().vmap(func, in_axis, out_axis)
}

// ---- sparse ----

pub fn coo_to_csr(coo: &CooTensor<f64>) -> Result<CsrTensor<f64>> {
    active_engine().coo_to_csr(coo)
}

pub fn coo_spmm(coo: &CooTensor<f64>, other: &DTensor) -> Result<DTensor> {
    active_engine().coo_spmm(coo, other)
}

pub fn csr_spmm(csr: &CsrTensor<f64>, other: &DTensor) -> Result<DTensor> {
    active_engine().csr_spmm(csr, other)
}

pub fn csr_spspmm(a: &CsrTensor<f64>, b: &CsrTensor<f64>) -> Result<CsrTensor<f64>> {
    active_engine().csr_spspmm(a, b)
}

// ---- finite-element kernels ----

pub fn multi_index_matrix(p: usize, td: usize) -> ITensor {
    active_engine().multi_index_matrix(p, td)
}

pub fn simplex_shape_function(bc: &DTensor, p: usize, mi: Option<&ITensor>) -> Result<DTensor> {
    active_engine().simplex_shape_function(bc, p, mi)
}

pub fn simplex_grad_shape_function(
    bc: &DTensor,
    p: usize,
    mi: Option<&ITensor>,
) -> Result<DTensor> {
    active_engine().simplex_grad_shape_function(bc, p, mi)
}

pub fn simplex_measure(entity: &ITensor, node: &DTensor) -> Result<DTensor> {
    active_engine().simplex_measure(entity, node)
}

pub fn edge_length(edge: &ITensor, node: &DTensor) -> Result<DTensor> {
    active_engine().edge_length(edge, node)
}

pub fn edge_normal(edge: &ITensor, node: &DTensor, unit: bool) -> Result<DTensor> {
    active_engine().edge_normal(edge, node, unit)
}

pub fn edge_tangent(edge: &ITensor, node: &DTensor, unit: bool) -> Result<DTensor> {
    active_engine().edge_tangent(edge, node, unit)
}

pub fn triangle_area_3d(tri: &ITensor, node: &DTensor) -> Result<DTensor> {
    active_engine().triangle_area_3d(tri, node)
}

pub fn interval_grad_lambda(line: &ITensor, node: &DTensor) -> Result<DTensor> {
    active_engine().interval_grad_lambda(line, node)
}

pub fn triangle_grad_lambda_2d(tri: &ITensor, node: &DTensor) -> Result<DTensor> {
    active_engine().triangle_grad_lambda_2d(tri, node)
}

pub fn triangle_grad_lambda_3d(tri: &ITensor, node: &DTensor) -> Result<DTensor> {
    active_engine().triangle_grad_lambda_3d(tri, node)
}

pub fn tetrahedron_grad_lambda_3d(
    tet: &ITensor,
    node: &DTensor,
    local_face: Option<&ITensor>,
) -> Result<DTensor> {
    active_engine().tetrahedron_grad_lambda_3d(tet, node, local_face)
}

pub fn barycenter(entity: &ITensor, node: &DTensor) -> Result<DTensor> {
    active_engine().barycenter(entity, node)
}

pub fn bc_to_points(bc: &DTensor, node: &DTensor, entity: &ITensor) -> Result<DTensor> {
    active_engine().bc_to_points(bc, node, entity)
}

/// The `random` grouped namespace, resolved lazily through the active
/// engine.
pub mod random {
    use super::*;
    use crate::tensor::Tensor;

    pub fn seed(seed: u64) {
        active_engine().random().seed(seed)
    }

    pub fn uniform(shape: &[usize]) -> DTensor {
        active_engine().random().uniform(shape)
    }

    pub fn integers(low: i64, high: i64, shape: &[usize]) -> Tensor<i64> {
        active_engine().random().integers(low, high, shape)
    }

    pub fn normal(shape: &[usize]) -> DTensor {
        active_engine().random().normal(shape)
    }
}

/// The `linalg` grouped namespace, resolved lazily through the active
/// engine.
pub mod linalg {
    use super::*;

    pub fn matmul(a: &DTensor, b: &DTensor) -> Result<DTensor> {
        active_engine().linalg().matmul(a, b)
    }

    pub fn det(tensor: &DTensor) -> Result<DTensor> {
        active_engine().linalg().det(tensor)
    }

    pub fn vector_norm(tensor: &DTensor, axis: Option<usize>) -> Result<DTensor> {
        active_engine().linalg().vector_norm(tensor, axis)
    }

    pub fn cross(a: &DTensor, b: &DTensor) -> Result<DTensor> {
        active_engine().linalg().cross(a, b)
    }

    pub fn dot(a: &DTensor, b: &DTensor) -> Result<DTensor> {
        active_engine().linalg().dot(a, b)
    }
}
