use super::all_engines;
use bifrost::engine::Engine;
use bifrost::fem;
use bifrost::{Error, Tensor};
use util::assert_approx_slice_eq;

fn unit_triangle_2d() -> (Tensor<usize>, Tensor<f64>) {
    (
        Tensor::from_data(&[1, 3], vec![0, 1, 2]),
        Tensor::from_data(&[3, 2], vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]),
    )
}

fn unit_tetrahedron() -> (Tensor<usize>, Tensor<f64>) {
    (
        Tensor::from_data(&[1, 4], vec![0, 1, 2, 3]),
        Tensor::from_data(
            &[4, 3],
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        ),
    )
}

#[test]
fn simplex_measure_of_reference_entities_on_every_engine() {
    let (tri, tri_node) = unit_triangle_2d();
    let (tet, tet_node) = unit_tetrahedron();
    let line = Tensor::from_data(&[1, 2], vec![0, 1]);
    let line_node = Tensor::from_data(&[2, 1], vec![1.0, 3.5]);

    for engine in all_engines() {
        let area = engine.simplex_measure(&tri, &tri_node).unwrap();
        assert!((area.data()[0] - 0.5).abs() < 1e-14, "{}", engine.name());

        let volume = engine.simplex_measure(&tet, &tet_node).unwrap();
        assert!(
            (volume.data()[0] - 1.0 / 6.0).abs() < 1e-14,
            "{}",
            engine.name()
        );

        let length = engine.simplex_measure(&line, &line_node).unwrap();
        assert!((length.data()[0] - 2.5).abs() < 1e-14, "{}", engine.name());
    }
}

#[test]
fn simplex_measure_requires_full_dimensional_embedding() {
    // A triangle in 3D is not a full-dimensional simplex.
    let tri = Tensor::from_data(&[1, 3], vec![0, 1, 2]);
    let node = Tensor::from_data(&[3, 3], vec![0.0; 9]);
    assert!(matches!(
        fem::simplex_measure(&tri, &node),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn triangle_area_3d_agrees_with_planar_measure() {
    let tri = Tensor::from_data(&[2, 3], vec![0, 1, 2, 0, 2, 3]);
    // The unit square split along a diagonal, embedded at z = 2.
    let node = Tensor::from_data(
        &[4, 3],
        vec![
            0.0, 0.0, 2.0, 1.0, 0.0, 2.0, 1.0, 1.0, 2.0, 0.0, 1.0, 2.0,
        ],
    );
    for engine in all_engines() {
        let area = engine.triangle_area_3d(&tri, &node).unwrap();
        assert_approx_slice_eq!(area.data(), [0.5, 0.5], abstol = 1e-14);
    }
}

#[test]
fn grad_lambda_kernels_have_vanishing_row_sums() {
    let (tri, tri_node) = unit_triangle_2d();
    let (tet, tet_node) = unit_tetrahedron();
    let tri3d_node = Tensor::from_data(
        &[3, 3],
        vec![0.0, 0.0, 1.0, 2.0, 0.5, 1.0, 0.5, 3.0, 1.0],
    );

    for engine in all_engines() {
        for (grad, nvc, gd) in [
            (engine.triangle_grad_lambda_2d(&tri, &tri_node).unwrap(), 3, 2),
            (engine.triangle_grad_lambda_3d(&tri, &tri3d_node).unwrap(), 3, 3),
            (
                engine
                    .tetrahedron_grad_lambda_3d(&tet, &tet_node, None)
                    .unwrap(),
                4,
                3,
            ),
        ] {
            for d in 0..gd {
                let total: f64 = (0..nvc).map(|i| grad.data()[i * gd + d]).sum();
                assert!(
                    total.abs() < 1e-12,
                    "engine {}, nvc {nvc}, direction {d}: {total}",
                    engine.name()
                );
            }
        }
    }
}

#[test]
fn triangle_grad_lambda_2d_recovers_linear_fields() {
    // For u(x) = a·x + c on a triangle, Σ_i u(p_i) ∇λ_i = a.
    let tri = Tensor::from_data(&[1, 3], vec![0, 1, 2]);
    let node = Tensor::from_data(&[3, 2], vec![0.2, 0.1, 1.3, 0.4, 0.5, 1.7]);
    let a = [1.5, -2.0];
    let u = |x: &[f64]| a[0] * x[0] + a[1] * x[1] + 0.7;

    let grad = fem::triangle_grad_lambda_2d(&tri, &node).unwrap();
    let mut recovered = [0.0, 0.0];
    for i in 0..3 {
        let p = &node.data()[i * 2..(i + 1) * 2];
        recovered[0] += u(p) * grad.data()[i * 2];
        recovered[1] += u(p) * grad.data()[i * 2 + 1];
    }
    assert_approx_slice_eq!(recovered, a, abstol = 1e-12);
}

#[test]
fn degenerate_entities_are_reported_not_divided() {
    let tri = Tensor::from_data(&[1, 3], vec![0, 1, 2]);
    let collinear = Tensor::from_data(&[3, 2], vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    let tet = Tensor::from_data(&[1, 4], vec![0, 1, 2, 3]);
    let coplanar = Tensor::from_data(
        &[4, 3],
        vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
    );

    for engine in all_engines() {
        assert!(
            matches!(
                engine.triangle_grad_lambda_2d(&tri, &collinear),
                Err(Error::DegenerateGeometry { entity: 0, .. })
            ),
            "{}",
            engine.name()
        );
        assert!(
            matches!(
                engine.tetrahedron_grad_lambda_3d(&tet, &coplanar, None),
                Err(Error::DegenerateGeometry { entity: 0, .. })
            ),
            "{}",
            engine.name()
        );
    }
}

#[test]
fn edge_kernels_shapes_and_values() {
    let node = Tensor::from_data(&[3, 2], vec![0.0, 0.0, 3.0, 4.0, 3.0, 0.0]);
    let edge = Tensor::from_data(&[2, 2], vec![0, 1, 1, 2]);

    for engine in all_engines() {
        let lengths = engine.edge_length(&edge, &node).unwrap();
        assert_approx_slice_eq!(lengths.data(), [5.0, 4.0], abstol = 1e-14);

        let tangent = engine.edge_tangent(&edge, &node, true).unwrap();
        assert_approx_slice_eq!(
            &tangent.data()[..2],
            [0.6, 0.8],
            abstol = 1e-14
        );

        let normal = engine.edge_normal(&edge, &node, false).unwrap();
        assert_approx_slice_eq!(&normal.data()[..2], [4.0, -3.0], abstol = 1e-14);
    }
}

#[test]
fn edge_normal_requires_a_planar_mesh() {
    let node = Tensor::from_data(&[2, 3], vec![0.0; 6]);
    let edge = Tensor::from_data(&[1, 2], vec![0, 1]);
    assert!(matches!(
        fem::edge_normal(&edge, &node, false),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn interval_grad_lambda_recovers_linear_interpolation_slope() {
    let line = Tensor::from_data(&[1, 2], vec![0, 1]);
    let node: Tensor<f64> = Tensor::from_data(&[2, 1], vec![1.0, 4.0]);
    let grad = fem::interval_grad_lambda(&line, &node).unwrap();
    // u(x) = 2x: slope from nodal values 2 and 8.
    let slope = 2.0 * grad.data()[0] + 8.0 * grad.data()[1];
    assert!((slope - 2.0).abs() < 1e-13);
}

#[test]
fn bc_to_points_reproduces_vertices_and_centers() {
    let (tri, node) = unit_triangle_2d();
    for engine in all_engines() {
        // Vertex barycentric coordinates give back the vertices.
        let bc = Tensor::from_data(
            &[3, 3],
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        );
        let points = engine.bc_to_points(&bc, &node, &tri).unwrap();
        assert_eq!(points.shape(), &[1, 3, 2]);
        assert_approx_slice_eq!(points.data(), node.data(), abstol = 1e-14);

        // The center of mass matches `barycenter`.
        let center_bc = Tensor::from_data(&[1, 3], vec![1.0 / 3.0; 3]);
        let center = engine.bc_to_points(&center_bc, &node, &tri).unwrap();
        let reference = engine.barycenter(&tri, &node).unwrap();
        assert_approx_slice_eq!(center.data(), reference.data(), abstol = 1e-14);
    }
}
