use bifrost::fem::{
    multi_index_matrix, simplex_grad_shape_function, simplex_ldof, simplex_shape_function,
};
use bifrost::Tensor;
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;
use std::collections::HashSet;

/// Barycentric points of a `td`-simplex: positive weights normalized to sum
/// one.
fn barycentric_points(td: usize) -> impl Strategy<Value = Vec<f64>> {
    prop_vec(0.01..1.0f64, td + 1).prop_map(|mut weights| {
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        weights
    })
}

#[test]
fn multi_index_matrix_counts_rows_and_degrees() {
    for td in 1..=3 {
        for p in 0..=6 {
            let mi = multi_index_matrix(p, td);
            assert_eq!(mi.shape(), &[simplex_ldof(p, td), td + 1]);

            let mut seen = HashSet::new();
            for row in mi.data().chunks(td + 1) {
                assert_eq!(row.iter().sum::<usize>(), p, "row degree mismatch");
                assert!(seen.insert(row.to_vec()), "duplicate multi-index {row:?}");
            }
        }
    }
}

#[test]
fn multi_index_matrix_is_stable_across_calls() {
    assert_eq!(multi_index_matrix(4, 2), multi_index_matrix(4, 2));
    assert_eq!(
        multi_index_matrix(2, 3).data(),
        multi_index_matrix(2, 3).data()
    );
}

proptest! {
    #[test]
    fn shape_functions_partition_unity(
        bc1 in barycentric_points(1),
        bc2 in barycentric_points(2),
        bc3 in barycentric_points(3),
        p in 0usize..=5,
    ) {
        for bc in [bc1, bc2, bc3] {
            let nvc = bc.len();
            let bc = Tensor::from_data(&[1, nvc], bc);
            let phi = simplex_shape_function(&bc, p, None).unwrap();
            prop_assert_eq!(phi.shape(), &[1, simplex_ldof(p, nvc - 1)]);
            let total: f64 = phi.data().iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-12, "sum was {}", total);
        }
    }

    #[test]
    fn grad_shape_functions_rows_sum_to_zero(
        bc in barycentric_points(2),
        p in 0usize..=5,
    ) {
        let bc = Tensor::from_data(&[1, 3], bc);
        let grad = simplex_grad_shape_function(&bc, p, None).unwrap();
        let ldof = simplex_ldof(p, 2);
        prop_assert_eq!(grad.shape(), &[1, ldof, 3]);
        // The basis sums to the constant one, so the gradients cancel in
        // every barycentric direction.
        for dir in 0..3 {
            let total: f64 = (0..ldof).map(|i| grad.data()[i * 3 + dir]).sum();
            prop_assert!(total.abs() < 1e-10, "direction {} summed to {}", dir, total);
        }
    }
}

#[test]
fn shape_function_values_interpolate_lagrange_nodes() {
    // Evaluating at the dof nodes (mi / p) must give the identity matrix.
    for td in 1..=3 {
        for p in 1..=4 {
            let mi = multi_index_matrix(p, td);
            let ldof = mi.shape()[0];
            let nodes: Vec<f64> = mi.data().iter().map(|&m| m as f64 / p as f64).collect();
            let bc = Tensor::from_data(&[ldof, td + 1], nodes);
            let phi = simplex_shape_function(&bc, p, None).unwrap();
            for i in 0..ldof {
                for j in 0..ldof {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    let got = phi.data()[i * ldof + j];
                    assert!(
                        (got - expected).abs() < 1e-10,
                        "phi_{j} at node {i} was {got} for p={p}, td={td}"
                    );
                }
            }
        }
    }
}

#[test]
fn gradients_match_central_finite_differences_up_to_degree_seven() {
    let bc: Tensor<f64> = Tensor::from_data(&[1, 3], vec![0.31, 0.45, 0.24]);
    let h = 1e-6;
    for p in 1..=7 {
        let ldof = simplex_ldof(p, 2);
        let grad = simplex_grad_shape_function(&bc, p, None).unwrap();
        for dir in 0..3 {
            let mut forward = bc.clone();
            forward.data_mut()[dir] += h;
            let mut backward = bc.clone();
            backward.data_mut()[dir] -= h;
            let phi_f = simplex_shape_function(&forward, p, None).unwrap();
            let phi_b = simplex_shape_function(&backward, p, None).unwrap();
            for i in 0..ldof {
                let fd = (phi_f.data()[i] - phi_b.data()[i]) / (2.0 * h);
                let analytic = grad.data()[i * 3 + dir];
                assert!(
                    (fd - analytic).abs() < 1e-4 * analytic.abs().max(1.0),
                    "p={p}, dof {i}, dir {dir}: fd={fd}, analytic={analytic}"
                );
            }
        }
    }
}

#[test]
fn explicit_multi_index_matches_default() {
    let bc = Tensor::from_data(&[2, 3], vec![0.5, 0.2, 0.3, 0.1, 0.1, 0.8]);
    let mi = multi_index_matrix(3, 2);
    let with_mi = simplex_shape_function(&bc, 3, Some(&mi)).unwrap();
    let without = simplex_shape_function(&bc, 3, None).unwrap();
    assert_eq!(with_mi, without);
}

#[test]
fn leading_batch_dimensions_are_preserved() {
    // A (2, 4, 3) batch of barycentric points on triangles.
    let mut data = Vec::new();
    for i in 0..8 {
        let a = 0.1 + 0.05 * i as f64;
        data.extend_from_slice(&[a, 0.5 - a / 2.0, 0.5 - a / 2.0]);
    }
    let bc = Tensor::from_data(&[2, 4, 3], data);
    let phi = simplex_shape_function(&bc, 2, None).unwrap();
    assert_eq!(phi.shape(), &[2, 4, 6]);
    let grad = simplex_grad_shape_function(&bc, 2, None).unwrap();
    assert_eq!(grad.shape(), &[2, 4, 6, 3]);
}

#[test]
fn generic_kernels_accept_f32() {
    let bc = Tensor::<f32>::from_data(&[1, 3], vec![0.25, 0.25, 0.5]);
    let phi = simplex_shape_function(&bc, 2, None).unwrap();
    let total: f32 = phi.data().iter().sum();
    assert!((total - 1.0).abs() < 1e-5);
}
