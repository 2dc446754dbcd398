//! Per-entity geometric quantities for simplex meshes.
//!
//! Every kernel takes an entity-to-node index tensor of shape `(NE, NVC)`
//! and a node-coordinate tensor of shape `(NN, GD)`, and returns a
//! per-entity quantity. Zero-measure entities in gradient kernels are
//! reported as [`Error::DegenerateGeometry`], never divided through
//! silently.

use crate::error::{Error, Result};
use crate::tensor::{ITensor, Tensor};
use crate::Real;
use numeric_literals::replace_float_literals;

/// Local faces of the reference tetrahedron, each opposite the vertex of the
/// same index and oriented so that face normals point outward.
pub const TETRAHEDRON_LOCAL_FACES: [[usize; 3]; 4] =
    [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

fn check_entity(op: &str, entity: &ITensor, nvc: usize) -> Result<usize> {
    if entity.ndim() != 2 || entity.shape()[1] != nvc {
        return Err(Error::shape_mismatch(
            op,
            format!("an entity tensor of shape (NE, {nvc})"),
            format!("{:?}", entity.shape()),
        ));
    }
    Ok(entity.shape()[0])
}

fn check_node<T: Real>(op: &str, node: &Tensor<T>, gd: Option<usize>) -> Result<usize> {
    match (node.ndim(), gd) {
        (2, None) => Ok(node.shape()[1]),
        (2, Some(gd)) if node.shape()[1] == gd => Ok(gd),
        _ => Err(Error::shape_mismatch(
            op,
            match gd {
                Some(gd) => format!("node coordinates of shape (NN, {gd})"),
                None => "node coordinates of shape (NN, GD)".to_string(),
            },
            format!("{:?}", node.shape()),
        )),
    }
}

#[inline]
fn point<'a, T>(node: &'a Tensor<T>, index: usize, gd: usize) -> &'a [T] {
    &node.data()[index * gd..(index + 1) * gd]
}

#[inline]
fn sub<T: Real>(a: &[T], b: &[T], out: &mut [T]) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x - y;
    }
}

#[inline]
fn norm_squared<T: Real>(v: &[T]) -> T {
    v.iter().fold(T::zero(), |acc, &x| acc + x * x)
}

#[inline]
fn cross3<T: Real>(a: &[T], b: &[T]) -> [T; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Gathers the vertex coordinates of each entity into a tensor of shape
/// `(NE, NVC, GD)`.
pub fn gather_entity_points<T: Real>(entity: &ITensor, node: &Tensor<T>) -> Result<Tensor<T>> {
    let gd = check_node("gather_entity_points", node, None)?;
    if entity.ndim() != 2 {
        return Err(Error::shape_mismatch(
            "gather_entity_points",
            "an entity tensor of shape (NE, NVC)",
            format!("{:?}", entity.shape()),
        ));
    }
    let (ne, nvc) = (entity.shape()[0], entity.shape()[1]);
    let mut data = Vec::with_capacity(ne * nvc * gd);
    for &index in entity.data() {
        data.extend_from_slice(point(node, index, gd));
    }
    Ok(Tensor::from_data(&[ne, nvc, gd], data))
}

/// Lengths of the given edges, shape `(NE,)`.
pub fn edge_length<T: Real>(edge: &ITensor, node: &Tensor<T>) -> Result<Tensor<T>> {
    let ne = check_entity("edge_length", edge, 2)?;
    let gd = check_node("edge_length", node, None)?;
    let mut out = Vec::with_capacity(ne);
    let mut v = vec![T::zero(); gd];
    for pair in edge.data().chunks(2) {
        sub(point(node, pair[1], gd), point(node, pair[0], gd), &mut v);
        out.push(norm_squared(&v).sqrt());
    }
    Ok(Tensor::from_data(&[ne], out))
}

/// Edge normals `(v_y, -v_x)` for 2D meshes, shape `(NE, 2)`.
///
/// With `unit` set, the normals are normalized; a zero-length edge is then a
/// degenerate-geometry error.
pub fn edge_normal<T: Real>(edge: &ITensor, node: &Tensor<T>, unit: bool) -> Result<Tensor<T>> {
    let ne = check_entity("edge_normal", edge, 2)?;
    check_node("edge_normal", node, Some(2))?;
    let mut out = Vec::with_capacity(ne * 2);
    let mut v = [T::zero(); 2];
    for (e, pair) in edge.data().chunks(2).enumerate() {
        sub(point(node, pair[1], 2), point(node, pair[0], 2), &mut v);
        if unit {
            let length = norm_squared(&v).sqrt();
            if length.is_zero() {
                return Err(Error::DegenerateGeometry {
                    op: "edge_normal".to_string(),
                    entity: e,
                });
            }
            v[0] /= length;
            v[1] /= length;
        }
        out.push(v[1]);
        out.push(-v[0]);
    }
    Ok(Tensor::from_data(&[ne, 2], out))
}

/// Edge tangent vectors `p1 - p0`, shape `(NE, GD)`, optionally normalized.
pub fn edge_tangent<T: Real>(edge: &ITensor, node: &Tensor<T>, unit: bool) -> Result<Tensor<T>> {
    let ne = check_entity("edge_tangent", edge, 2)?;
    let gd = check_node("edge_tangent", node, None)?;
    let mut out = Vec::with_capacity(ne * gd);
    let mut v = vec![T::zero(); gd];
    for (e, pair) in edge.data().chunks(2).enumerate() {
        sub(point(node, pair[1], gd), point(node, pair[0], gd), &mut v);
        if unit {
            let length = norm_squared(&v).sqrt();
            if length.is_zero() {
                return Err(Error::DegenerateGeometry {
                    op: "edge_tangent".to_string(),
                    entity: e,
                });
            }
            for component in v.iter_mut() {
                *component /= length;
            }
        }
        out.extend_from_slice(&v);
    }
    Ok(Tensor::from_data(&[ne, gd], out))
}

/// Areas of triangles embedded in 3D, shape `(NE,)`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn triangle_area_3d<T: Real>(tri: &ITensor, node: &Tensor<T>) -> Result<Tensor<T>> {
    let ne = check_entity("triangle_area_3d", tri, 3)?;
    check_node("triangle_area_3d", node, Some(3))?;
    let mut out = Vec::with_capacity(ne);
    let (mut e1, mut e2) = ([T::zero(); 3], [T::zero(); 3]);
    for vertices in tri.data().chunks(3) {
        let p0 = point(node, vertices[0], 3);
        sub(point(node, vertices[1], 3), p0, &mut e1);
        sub(point(node, vertices[2], 3), p0, &mut e2);
        out.push(0.5 * norm_squared(&cross3(&e1, &e2)).sqrt());
    }
    Ok(Tensor::from_data(&[ne], out))
}

/// Barycentric-coordinate gradients on intervals, shape `(NE, 2, GD)`.
pub fn interval_grad_lambda<T: Real>(line: &ITensor, node: &Tensor<T>) -> Result<Tensor<T>> {
    let ne = check_entity("interval_grad_lambda", line, 2)?;
    let gd = check_node("interval_grad_lambda", node, None)?;
    let mut out = Vec::with_capacity(ne * 2 * gd);
    let mut v = vec![T::zero(); gd];
    for (e, pair) in line.data().chunks(2).enumerate() {
        sub(point(node, pair[1], gd), point(node, pair[0], gd), &mut v);
        let h2 = norm_squared(&v);
        if h2.is_zero() {
            return Err(Error::DegenerateGeometry {
                op: "interval_grad_lambda".to_string(),
                entity: e,
            });
        }
        for component in v.iter_mut() {
            *component /= h2;
        }
        for &component in v.iter() {
            out.push(-component);
        }
        out.extend_from_slice(&v);
    }
    Ok(Tensor::from_data(&[ne, 2, gd], out))
}

/// Barycentric-coordinate gradients on 2D triangles, shape `(NE, 3, 2)`.
///
/// Normalizes by twice the signed area; zero-area triangles are a
/// degenerate-geometry error.
pub fn triangle_grad_lambda_2d<T: Real>(tri: &ITensor, node: &Tensor<T>) -> Result<Tensor<T>> {
    let ne = check_entity("triangle_grad_lambda_2d", tri, 3)?;
    check_node("triangle_grad_lambda_2d", node, Some(2))?;
    let mut out = Vec::with_capacity(ne * 3 * 2);
    let (mut e0, mut e1, mut e2) = ([T::zero(); 2], [T::zero(); 2], [T::zero(); 2]);
    for (e, vertices) in tri.data().chunks(3).enumerate() {
        let p0 = point(node, vertices[0], 2);
        let p1 = point(node, vertices[1], 2);
        let p2 = point(node, vertices[2], 2);
        sub(p2, p1, &mut e0);
        sub(p0, p2, &mut e1);
        sub(p1, p0, &mut e2);
        // Twice the signed area.
        let nv = e0[0] * e1[1] - e0[1] * e1[0];
        if nv.is_zero() {
            return Err(Error::DegenerateGeometry {
                op: "triangle_grad_lambda_2d".to_string(),
                entity: e,
            });
        }
        for edge in [&e0, &e1, &e2] {
            out.push(-edge[1] / nv);
            out.push(edge[0] / nv);
        }
    }
    Ok(Tensor::from_data(&[ne, 3, 2], out))
}

/// Barycentric-coordinate gradients on triangles embedded in 3D, shape
/// `(NE, 3, 3)`.
pub fn triangle_grad_lambda_3d<T: Real>(tri: &ITensor, node: &Tensor<T>) -> Result<Tensor<T>> {
    let ne = check_entity("triangle_grad_lambda_3d", tri, 3)?;
    check_node("triangle_grad_lambda_3d", node, Some(3))?;
    let mut out = Vec::with_capacity(ne * 3 * 3);
    let (mut e0, mut e1, mut e2) = ([T::zero(); 3], [T::zero(); 3], [T::zero(); 3]);
    for (e, vertices) in tri.data().chunks(3).enumerate() {
        let p0 = point(node, vertices[0], 3);
        let p1 = point(node, vertices[1], 3);
        let p2 = point(node, vertices[2], 3);
        sub(p2, p1, &mut e0);
        sub(p0, p2, &mut e1);
        sub(p1, p0, &mut e2);
        let nv = cross3(&e0, &e1);
        let length = norm_squared(&nv).sqrt();
        if length.is_zero() {
            return Err(Error::DegenerateGeometry {
                op: "triangle_grad_lambda_3d".to_string(),
                entity: e,
            });
        }
        let n = [nv[0] / length, nv[1] / length, nv[2] / length];
        for edge in [&e0, &e1, &e2] {
            let grad = cross3(&n, edge);
            for component in grad {
                out.push(component / length);
            }
        }
    }
    Ok(Tensor::from_data(&[ne, 3, 3], out))
}

/// Barycentric-coordinate gradients on tetrahedra, shape `(NC, 4, 3)`.
///
/// `local_face` lists, per vertex, the opposite face `(j, k, m)`; pass
/// `None` for the canonical [`TETRAHEDRON_LOCAL_FACES`].
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn tetrahedron_grad_lambda_3d<T: Real>(
    tet: &ITensor,
    node: &Tensor<T>,
    local_face: Option<&ITensor>,
) -> Result<Tensor<T>> {
    let nc = check_entity("tetrahedron_grad_lambda_3d", tet, 4)?;
    check_node("tetrahedron_grad_lambda_3d", node, Some(3))?;
    let default_faces;
    let local_face = match local_face {
        Some(faces) => faces,
        None => {
            default_faces = Tensor::from_data(
                &[4, 3],
                TETRAHEDRON_LOCAL_FACES.iter().flatten().copied().collect(),
            );
            &default_faces
        }
    };
    if local_face.shape() != [4, 3] {
        return Err(Error::shape_mismatch(
            "tetrahedron_grad_lambda_3d",
            "a local-face tensor of shape (4, 3)",
            format!("{:?}", local_face.shape()),
        ));
    }

    let volume = simplex_measure(tet, node)?;
    let six = 6.0;
    let mut out = Vec::with_capacity(nc * 4 * 3);
    let (mut vjk, mut vjm) = ([T::zero(); 3], [T::zero(); 3]);
    for (c, vertices) in tet.data().chunks(4).enumerate() {
        let vol = volume.data()[c];
        if vol.is_zero() {
            return Err(Error::DegenerateGeometry {
                op: "tetrahedron_grad_lambda_3d".to_string(),
                entity: c,
            });
        }
        for face in local_face.data().chunks(3) {
            let (j, k, m) = (vertices[face[0]], vertices[face[1]], vertices[face[2]]);
            let pj = point(node, j, 3);
            sub(point(node, k, 3), pj, &mut vjk);
            sub(point(node, m, 3), pj, &mut vjm);
            let grad = cross3(&vjm, &vjk);
            for component in grad {
                out.push(component / (six * vol));
            }
        }
    }
    Ok(Tensor::from_data(&[nc, 4, 3], out))
}

/// Signed measures of full-dimensional simplices, shape `(NE,)`.
///
/// The determinant of the edge-vector matrix divided by `TD!` unifies
/// interval length, triangle area and tetrahedron volume. The node
/// dimension must equal `NVC - 1`.
pub fn simplex_measure<T: Real>(entity: &ITensor, node: &Tensor<T>) -> Result<Tensor<T>> {
    if entity.ndim() != 2 || entity.shape()[1] < 2 {
        return Err(Error::shape_mismatch(
            "simplex_measure",
            "an entity tensor of shape (NE, TD + 1)",
            format!("{:?}", entity.shape()),
        ));
    }
    let td = entity.shape()[1] - 1;
    let gd = check_node("simplex_measure", node, None)?;
    if td != gd || !(1..=3).contains(&td) {
        return Err(Error::shape_mismatch(
            "simplex_measure",
            format!("node coordinates of dimension {td} (= NVC - 1, at most 3)"),
            format!("{gd}"),
        ));
    }
    let ne = entity.shape()[0];
    let factorial = T::from_f64([1.0, 1.0, 2.0, 6.0][td]).unwrap();

    let mut out = Vec::with_capacity(ne);
    let mut edges = vec![T::zero(); td * td];
    for vertices in entity.data().chunks(td + 1) {
        for i in 0..td {
            let (head, tail) = (point(node, vertices[i + 1], gd), point(node, vertices[i], gd));
            let row = &mut edges[i * td..(i + 1) * td];
            sub(head, tail, row);
        }
        let det = match td {
            1 => edges[0],
            2 => edges[0] * edges[3] - edges[1] * edges[2],
            _ => {
                edges[0] * (edges[4] * edges[8] - edges[5] * edges[7])
                    - edges[1] * (edges[3] * edges[8] - edges[5] * edges[6])
                    + edges[2] * (edges[3] * edges[7] - edges[4] * edges[6])
            }
        };
        out.push(det / factorial);
    }
    Ok(Tensor::from_data(&[ne], out))
}

/// Per-entity vertex means, shape `(NE, GD)`.
pub fn barycenter<T: Real>(entity: &ITensor, node: &Tensor<T>) -> Result<Tensor<T>> {
    let gd = check_node("barycenter", node, None)?;
    if entity.ndim() != 2 || entity.shape()[1] == 0 {
        return Err(Error::shape_mismatch(
            "barycenter",
            "an entity tensor of shape (NE, NVC)",
            format!("{:?}", entity.shape()),
        ));
    }
    let (ne, nvc) = (entity.shape()[0], entity.shape()[1]);
    let weight = T::from_f64(1.0 / nvc as f64).unwrap();
    let mut out = Vec::with_capacity(ne * gd);
    for vertices in entity.data().chunks(nvc) {
        for d in 0..gd {
            let sum = vertices
                .iter()
                .fold(T::zero(), |acc, &v| acc + point(node, v, gd)[d]);
            out.push(sum * weight);
        }
    }
    Ok(Tensor::from_data(&[ne, gd], out))
}
