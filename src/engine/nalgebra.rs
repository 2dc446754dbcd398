//! An engine lowering operations to `nalgebra` and `nalgebra-sparse`.
//!
//! Rank-≤2 arithmetic, reductions and linear algebra go through `nalgebra`
//! matrices; sparse products go through `nalgebra-sparse`'s native kernels;
//! the geometric kernels use fixed-size vector math. Anything the native
//! library cannot express (rank ≥ 3 elementwise work, for instance) falls
//! back to the shared host loops, so the canonical surface stays total.

use crate::engine::{binary_host, check_sparse_operand, Engine};
use crate::error::{Error, Result};
use crate::fem;
use crate::linalg::{square_batch_shape, HostLinalg, LinalgOps};
use crate::ops::{BinaryOp, ReduceOp};
use crate::random::{RandomOps, ThreadLocalRandom};
use crate::tensor::{DTensor, ITensor, Tensor};
use bifrost_sparse::{CooTensor, CsrTensor};
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, Vector2, Vector3};
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix;

pub struct NalgebraEngine {
    linalg: NalgebraLinalg,
    random: ThreadLocalRandom,
}

impl NalgebraEngine {
    pub fn new() -> Self {
        Self {
            linalg: NalgebraLinalg {
                host: HostLinalg { engine: "nalgebra" },
            },
            random: ThreadLocalRandom::default(),
        }
    }
}

impl Default for NalgebraEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Interprets a rank-≤2 tensor as a matrix; rank-1 becomes a single row.
fn as_matrix(t: &DTensor) -> Option<DMatrix<f64>> {
    match t.shape() {
        [] => Some(DMatrix::from_row_slice(1, 1, t.data())),
        [n] => Some(DMatrix::from_row_slice(1, *n, t.data())),
        [r, c] => Some(DMatrix::from_row_slice(*r, *c, t.data())),
        _ => None,
    }
}

fn from_matrix(m: DMatrix<f64>, shape: &[usize]) -> DTensor {
    let data = m.transpose().as_slice().to_vec();
    Tensor::from_data(shape, data)
}

fn to_native_csr(csr: &CsrTensor<f64>) -> CsrMatrix<f64> {
    CsrMatrix::try_from_csr_data(
        csr.nrows(),
        csr.ncols(),
        csr.row_offsets().to_vec(),
        csr.col_indices().to_vec(),
        csr.values().to_vec(),
    )
    .expect("CSR invariants hold by construction")
}

fn from_native_csr(csr: CsrMatrix<f64>) -> CsrTensor<f64> {
    let nrows = csr.nrows();
    let ncols = csr.ncols();
    let (row_offsets, col_indices, values) = csr.disassemble();
    CsrTensor::from_csr_data(nrows, ncols, row_offsets, col_indices, values)
}

fn vec2(node: &DTensor, index: usize) -> Vector2<f64> {
    Vector2::new(node.data()[index * 2], node.data()[index * 2 + 1])
}

fn vec3(node: &DTensor, index: usize) -> Vector3<f64> {
    let p = &node.data()[index * 3..index * 3 + 3];
    Vector3::new(p[0], p[1], p[2])
}

impl Engine for NalgebraEngine {
    fn name(&self) -> &str {
        "nalgebra"
    }

    fn linalg(&self) -> &dyn LinalgOps {
        &self.linalg
    }

    fn random(&self) -> &dyn RandomOps {
        &self.random
    }

    fn eye(&self, n: usize, device: Option<&crate::device::Device>) -> Result<DTensor> {
        self.check_device(device)?;
        Ok(from_matrix(DMatrix::identity(n, n), &[n, n]))
    }

    fn binary(&self, a: &DTensor, b: &DTensor, op: BinaryOp) -> Result<DTensor> {
        if a.shape() != b.shape() {
            return binary_host(a, b, op);
        }
        match (as_matrix(a), as_matrix(b)) {
            (Some(ma), Some(mb)) => {
                let result = match op {
                    BinaryOp::Add => ma + mb,
                    BinaryOp::Sub => ma - mb,
                    BinaryOp::Mul => ma.component_mul(&mb),
                    BinaryOp::Div => ma.component_div(&mb),
                    _ => ma.zip_map(&mb, |x, y| op.eval(x, y)),
                };
                Ok(from_matrix(result, a.shape()))
            }
            _ => binary_host(a, b, op),
        }
    }

    fn reduce(
        &self,
        tensor: &DTensor,
        op: ReduceOp,
        axis: Option<usize>,
        keepdims: bool,
    ) -> Result<DTensor> {
        // Rank-2 sums lower to nalgebra's row/column folds.
        if let (Some(axis), [r, c], ReduceOp::Sum | ReduceOp::Mean) =
            (axis, tensor.shape(), op)
        {
            let m = DMatrix::from_row_slice(*r, *c, tensor.data());
            let (mut data, len): (Vec<f64>, usize) = match axis {
                0 => (m.row_sum().iter().copied().collect(), *r),
                1 => (m.column_sum().iter().copied().collect(), *c),
                _ => {
                    return Err(Error::InvalidAxis {
                        op: op.name().to_string(),
                        axis,
                        ndim: 2,
                    })
                }
            };
            if op == ReduceOp::Mean {
                for value in &mut data {
                    *value /= len as f64;
                }
            }
            let shape: Vec<usize> = match (axis, keepdims) {
                (0, false) => vec![*c],
                (0, true) => vec![1, *c],
                (_, false) => vec![*r],
                (_, true) => vec![*r, 1],
            };
            return Ok(Tensor::from_data(&shape, data));
        }
        tensor.reduce(op, axis, keepdims)
    }

    // ---- sparse products through nalgebra-sparse ----

    fn coo_to_csr(&self, coo: &CooTensor<f64>) -> Result<CsrTensor<f64>> {
        let native = CooMatrix::try_from_triplets(
            coo.nrows(),
            coo.ncols(),
            coo.row_indices().to_vec(),
            coo.col_indices().to_vec(),
            coo.values().to_vec(),
        )
        .expect("COO invariants hold by construction");
        Ok(from_native_csr(CsrMatrix::from(&native)))
    }

    fn coo_spmm(&self, coo: &CooTensor<f64>, other: &DTensor) -> Result<DTensor> {
        check_sparse_operand(self.name(), "coo_spmm", coo.ncols(), other)?;
        let csr = self.coo_to_csr(coo)?;
        self.csr_spmm(&csr, other)
    }

    fn csr_spmm(&self, csr: &CsrTensor<f64>, other: &DTensor) -> Result<DTensor> {
        check_sparse_operand(self.name(), "csr_spmm", csr.ncols(), other)?;
        let native = to_native_csr(csr);
        match other.ndim() {
            1 => {
                let x = DVector::from_column_slice(other.data());
                let y = &native * &x;
                Ok(Tensor::from_data(&[csr.nrows()], y.as_slice().to_vec()))
            }
            _ => {
                let k = other.shape()[1];
                let dense = DMatrix::from_row_slice(csr.ncols(), k, other.data());
                let result = &native * &dense;
                Ok(from_matrix(result, &[csr.nrows(), k]))
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
        let product = &to_native_csr(a) * &to_native_csr(b);
        Ok(from_native_csr(product))
    }

    // ---- geometric kernels in nalgebra fixed-size arithmetic ----

    fn edge_length(&self, edge: &ITensor, node: &DTensor) -> Result<DTensor> {
        match node.shape() {
            [_, 2] => {
                per_entity(edge, 2, "edge_length", |v| {
                    Ok((vec2(node, v[1]) - vec2(node, v[0])).norm())
                })
            }
            [_, 3] => {
                per_entity(edge, 2, "edge_length", |v| {
                    Ok((vec3(node, v[1]) - vec3(node, v[0])).norm())
                })
            }
            _ => fem::edge_length(edge, node),
        }
    }

    fn triangle_area_3d(&self, tri: &ITensor, node: &DTensor) -> Result<DTensor> {
        check_node_dim("triangle_area_3d", node, 3)?;
        per_entity(tri, 3, "triangle_area_3d", |v| {
            let e1 = vec3(node, v[1]) - vec3(node, v[0]);
            let e2 = vec3(node, v[2]) - vec3(node, v[0]);
            Ok(0.5 * e1.cross(&e2).norm())
        })
    }

    fn simplex_measure(&self, entity: &ITensor, node: &DTensor) -> Result<DTensor> {
        let nvc = entity.shape().get(1).copied().unwrap_or(0);
        match (nvc, node.shape()) {
            (2, [_, 1]) => per_entity(entity, 2, "simplex_measure", |v| {
                Ok(node.data()[v[1]] - node.data()[v[0]])
            }),
            (3, [_, 2]) => per_entity(entity, 3, "simplex_measure", |v| {
                let e0 = vec2(node, v[1]) - vec2(node, v[0]);
                let e1 = vec2(node, v[2]) - vec2(node, v[1]);
                Ok(Matrix2::from_rows(&[e0.transpose(), e1.transpose()]).determinant() / 2.0)
            }),
            (4, [_, 3]) => per_entity(entity, 4, "simplex_measure", |v| {
                let e0 = vec3(node, v[1]) - vec3(node, v[0]);
                let e1 = vec3(node, v[2]) - vec3(node, v[1]);
                let e2 = vec3(node, v[3]) - vec3(node, v[2]);
                let det = Matrix3::from_rows(&[e0.transpose(), e1.transpose(), e2.transpose()])
                    .determinant();
                Ok(det / 6.0)
            }),
            _ => fem::simplex_measure(entity, node),
        }
    }

    fn triangle_grad_lambda_2d(&self, tri: &ITensor, node: &DTensor) -> Result<DTensor> {
        check_node_dim("triangle_grad_lambda_2d", node, 2)?;
        per_entity_block(tri, 3, &[3, 2], "triangle_grad_lambda_2d", |e, v, out| {
            let e0 = vec2(node, v[2]) - vec2(node, v[1]);
            let e1 = vec2(node, v[0]) - vec2(node, v[2]);
            let e2 = vec2(node, v[1]) - vec2(node, v[0]);
            let nv = Matrix2::from_rows(&[e0.transpose(), e1.transpose()]).determinant();
            if nv == 0.0 {
                return Err(Error::DegenerateGeometry {
                    op: "triangle_grad_lambda_2d".to_string(),
                    entity: e,
                });
            }
            for edge in [e0, e1, e2] {
                out.push(-edge.y / nv);
                out.push(edge.x / nv);
            }
            Ok(())
        })
    }

    fn triangle_grad_lambda_3d(&self, tri: &ITensor, node: &DTensor) -> Result<DTensor> {
        check_node_dim("triangle_grad_lambda_3d", node, 3)?;
        per_entity_block(tri, 3, &[3, 3], "triangle_grad_lambda_3d", |e, v, out| {
            let e0 = vec3(node, v[2]) - vec3(node, v[1]);
            let e1 = vec3(node, v[0]) - vec3(node, v[2]);
            let e2 = vec3(node, v[1]) - vec3(node, v[0]);
            let nv = e0.cross(&e1);
            let length = nv.norm();
            if length == 0.0 {
                return Err(Error::DegenerateGeometry {
                    op: "triangle_grad_lambda_3d".to_string(),
                    entity: e,
                });
            }
            let n = nv / length;
            for edge in [e0, e1, e2] {
                let grad = n.cross(&edge) / length;
                out.extend_from_slice(grad.as_slice());
            }
            Ok(())
        })
    }

    fn tetrahedron_grad_lambda_3d(
        &self,
        tet: &ITensor,
        node: &DTensor,
        local_face: Option<&ITensor>,
    ) -> Result<DTensor> {
        check_node_dim("tetrahedron_grad_lambda_3d", node, 3)?;
        let default_faces = Tensor::from_data(
            &[4, 3],
            fem::TETRAHEDRON_LOCAL_FACES
                .iter()
                .flatten()
                .copied()
                .collect(),
        );
        let local_face = local_face.unwrap_or(&default_faces);
        if local_face.shape() != [4, 3] {
            return Err(Error::shape_mismatch(
                "tetrahedron_grad_lambda_3d",
                "a local-face tensor of shape (4, 3)",
                format!("{:?}", local_face.shape()),
            ));
        }
        let volume = self.simplex_measure(tet, node)?;
        per_entity_block(tet, 4, &[4, 3], "tetrahedron_grad_lambda_3d", |c, v, out| {
            let vol = volume.data()[c];
            if vol == 0.0 {
                return Err(Error::DegenerateGeometry {
                    op: "tetrahedron_grad_lambda_3d".to_string(),
                    entity: c,
                });
            }
            for face in local_face.data().chunks(3) {
                let pj = vec3(node, v[face[0]]);
                let vjk = vec3(node, v[face[1]]) - pj;
                let vjm = vec3(node, v[face[2]]) - pj;
                let grad = vjm.cross(&vjk) / (6.0 * vol);
                out.extend_from_slice(grad.as_slice());
            }
            Ok(())
        })
    }
}

fn check_node_dim(op: &str, node: &DTensor, gd: usize) -> Result<()> {
    if node.ndim() == 2 && node.shape()[1] == gd {
        Ok(())
    } else {
        Err(Error::shape_mismatch(
            op,
            format!("node coordinates of shape (NN, {gd})"),
            format!("{:?}", node.shape()),
        ))
    }
}

/// Applies a scalar-valued kernel to each entity row.
fn per_entity(
    entity: &ITensor,
    nvc: usize,
    op: &str,
    f: impl Fn(&[usize]) -> Result<f64>,
) -> Result<DTensor> {
    if entity.ndim() != 2 || entity.shape()[1] != nvc {
        return Err(Error::shape_mismatch(
            op,
            format!("an entity tensor of shape (NE, {nvc})"),
            format!("{:?}", entity.shape()),
        ));
    }
    let data = entity
        .data()
        .chunks(nvc)
        .map(f)
        .collect::<Result<Vec<_>>>()?;
    Ok(Tensor::from_data(&[entity.shape()[0]], data))
}

/// Applies a block-valued kernel to each entity row, producing shape
/// `(NE,) + block_shape`.
fn per_entity_block(
    entity: &ITensor,
    nvc: usize,
    block_shape: &[usize],
    op: &str,
    f: impl Fn(usize, &[usize], &mut Vec<f64>) -> Result<()>,
) -> Result<DTensor> {
    if entity.ndim() != 2 || entity.shape()[1] != nvc {
        return Err(Error::shape_mismatch(
            op,
            format!("an entity tensor of shape (NE, {nvc})"),
            format!("{:?}", entity.shape()),
        ));
    }
    let ne = entity.shape()[0];
    let block: usize = block_shape.iter().product();
    let mut data = Vec::with_capacity(ne * block);
    for (e, vertices) in entity.data().chunks(nvc).enumerate() {
        f(e, vertices, &mut data)?;
    }
    let mut shape = vec![ne];
    shape.extend_from_slice(block_shape);
    Ok(Tensor::from_data(&shape, data))
}

pub(crate) struct NalgebraLinalg {
    host: HostLinalg,
}

impl LinalgOps for NalgebraLinalg {
    fn matmul(&self, a: &DTensor, b: &DTensor) -> Result<DTensor> {
        let (m, k) = match a.shape() {
            [m, k] => (*m, *k),
            _ => return self.host.matmul(a, b),
        };
        let ma = DMatrix::from_row_slice(m, k, a.data());
        match b.shape() {
            [rows, n] if *rows == k => {
                let mb = DMatrix::from_row_slice(k, *n, b.data());
                Ok(from_matrix(&ma * &mb, &[m, *n]))
            }
            [rows] if *rows == k => {
                let x = DVector::from_column_slice(b.data());
                let y = &ma * &x;
                Ok(Tensor::from_data(&[m], y.as_slice().to_vec()))
            }
            _ => self.host.matmul(a, b),
        }
    }

    /// LU-based determinants for arbitrary matrix size.
    fn det(&self, t: &DTensor) -> Result<DTensor> {
        let (batch_shape, n) = square_batch_shape(t)?;
        let data = t
            .data()
            .chunks(n * n)
            .map(|chunk| DMatrix::from_row_slice(n, n, chunk).determinant())
            .collect();
        Ok(Tensor::from_data(&batch_shape, data))
    }

    fn vector_norm(&self, t: &DTensor, axis: Option<usize>) -> Result<DTensor> {
        self.host.vector_norm(t, axis)
    }

    fn cross(&self, a: &DTensor, b: &DTensor) -> Result<DTensor> {
        self.host.cross(a, b)
    }

    fn dot(&self, a: &DTensor, b: &DTensor) -> Result<DTensor> {
        self.host.dot(a, b)
    }
}
