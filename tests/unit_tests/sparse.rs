use super::all_engines;
use bifrost::dispatch;
use bifrost::engine::Engine;
use bifrost::sparse::{CooTensor, CsrTensor};
use bifrost::{Error, Tensor};
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;
use util::assert_approx_slice_eq;

/// Random COO matrices with duplicate entries allowed.
fn coo_strategy(
    nrows: usize,
    ncols: usize,
    max_nnz: usize,
) -> impl Strategy<Value = CooTensor<f64>> {
    prop_vec((0..nrows, 0..ncols, -10.0..10.0f64), 0..max_nnz).prop_map(
        move |triplets| {
            let mut coo = CooTensor::new(nrows, ncols);
            for (i, j, v) in triplets {
                coo.push(i, j, v);
            }
            coo
        },
    )
}

fn dense_matvec(dense: &[f64], ncols: usize, x: &[f64]) -> Vec<f64> {
    dense
        .chunks(ncols)
        .map(|row| row.iter().zip(x).map(|(a, b)| a * b).sum())
        .collect()
}

fn dense_matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut c = vec![0.0; m * n];
    for i in 0..m {
        for l in 0..k {
            for j in 0..n {
                c[i * n + j] += a[i * k + l] * b[l * n + j];
            }
        }
    }
    c
}

proptest! {
    #[test]
    fn coo_to_csr_then_spmv_matches_dense_on_every_engine(
        coo in coo_strategy(5, 5, 16),
        x in prop_vec(-5.0..5.0f64, 5),
    ) {
        let dense = coo.to_dense();
        let expected = dense_matvec(&dense, 5, &x);
        let x = Tensor::from_data(&[5], x);

        for engine in all_engines() {
            let csr = engine.coo_to_csr(&coo).unwrap();
            let y = engine.csr_spmm(&csr, &x).unwrap();
            let max_diff = y
                .data()
                .iter()
                .zip(&expected)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0f64, f64::max);
            prop_assert!(max_diff < 1e-10, "engine {}: {}", engine.name(), max_diff);

            let via_coo = engine.coo_spmm(&coo, &x).unwrap();
            prop_assert_eq!(via_coo.shape(), y.shape());
        }
    }

    #[test]
    fn csr_invariants_hold_after_conversion(coo in coo_strategy(6, 4, 24)) {
        let csr = coo.to_csr();
        let offsets = csr.row_offsets();
        prop_assert_eq!(offsets.len(), 7);
        prop_assert_eq!(offsets[0], 0);
        prop_assert_eq!(offsets[6], csr.nnz());
        prop_assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        for i in 0..6 {
            let (cols, _) = csr.row(i);
            prop_assert!(cols.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn spspmm_matches_dense_product(
        a in coo_strategy(4, 6, 12),
        b in coo_strategy(6, 3, 12),
    ) {
        let expected = dense_matmul(&a.to_dense(), &b.to_dense(), 4, 6, 3);
        let (a, b) = (a.to_csr(), b.to_csr());
        for engine in all_engines() {
            let c = engine.csr_spspmm(&a, &b).unwrap();
            let dense = c.to_dense();
            let max_diff = dense
                .iter()
                .zip(&expected)
                .map(|(x, y)| (x - y).abs())
                .fold(0.0f64, f64::max);
            prop_assert!(max_diff < 1e-10, "engine {}: {}", engine.name(), max_diff);
        }
    }
}

#[test]
fn duplicate_triplets_are_summed_by_every_engine() {
    let coo = CooTensor::from_triplets(
        2,
        2,
        vec![0, 0, 1, 0],
        vec![1, 1, 0, 1],
        vec![1.0, 2.5, 4.0, -0.5],
    );
    for engine in all_engines() {
        let csr = engine.coo_to_csr(&coo).unwrap();
        assert_eq!(csr.nnz(), 2, "{}", engine.name());
        assert_approx_slice_eq!(
            csr.to_dense(),
            [0.0, 3.0, 4.0, 0.0],
            abstol = 1e-14
        );
    }
}

#[test]
fn large_random_round_trip_through_the_dispatch_surface() {
    // A 100×100 matrix at roughly 20% fill, built from the random
    // namespace so the test is deterministic.
    dispatch::select_engine("cpu").unwrap();
    dispatch::random::seed(20240229);
    let rows = dispatch::random::integers(0, 100, &[2000]);
    let cols = dispatch::random::integers(0, 100, &[2000]);
    let values = dispatch::random::uniform(&[2000]);

    let mut coo = CooTensor::new(100, 100);
    for ((&i, &j), &v) in rows
        .data()
        .iter()
        .zip(cols.data())
        .zip(values.data())
    {
        coo.push(i as usize, j as usize, v - 0.5);
    }

    let x = dispatch::random::normal(&[100]);
    let expected = dense_matvec(&coo.to_dense(), 100, x.data());

    let csr = dispatch::coo_to_csr(&coo).unwrap();
    let y = dispatch::csr_spmm(&csr, &x).unwrap();
    let scale = expected.iter().fold(1.0f64, |m, v| m.max(v.abs()));
    for (a, b) in y.data().iter().zip(&expected) {
        assert!((a - b).abs() <= 1e-10 * scale);
    }
}

#[test]
fn matrix_operands_multiply_column_by_column() {
    let coo = CooTensor::from_triplets(
        3,
        3,
        vec![0, 1, 2, 2],
        vec![0, 1, 0, 2],
        vec![2.0, 3.0, 1.0, -1.0],
    );
    let csr = coo.to_csr();
    let dense_rhs = Tensor::from_data(&[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let expected = dense_matmul(&coo.to_dense(), dense_rhs.data(), 3, 3, 2);

    for engine in all_engines() {
        let product = engine.csr_spmm(&csr, &dense_rhs).unwrap();
        assert_eq!(product.shape(), &[3, 2], "{}", engine.name());
        assert_approx_slice_eq!(product.data(), expected, abstol = 1e-12);

        let via_coo = engine.coo_spmm(&coo, &dense_rhs).unwrap();
        assert_approx_slice_eq!(via_coo.data(), expected, abstol = 1e-12);
    }
}

#[test]
fn batched_operands_are_rejected_with_an_unsupported_signal() {
    let csr = CooTensor::from_triplets(2, 2, vec![0], vec![0], vec![1.0]).to_csr();
    let batched = Tensor::zeros(&[2, 2, 2]);
    for engine in all_engines() {
        match engine.csr_spmm(&csr, &batched) {
            Err(Error::UnsupportedOperation { op, .. }) => {
                assert!(op.contains("batched"), "{}", op)
            }
            other => panic!("expected unsupported-operation, got {other:?}"),
        }
    }
}

#[test]
fn dimension_mismatches_are_shape_errors() {
    let csr = CooTensor::from_triplets(2, 3, vec![0], vec![2], vec![1.0]).to_csr();
    let wrong = Tensor::zeros(&[4]);
    for engine in all_engines() {
        assert!(matches!(
            engine.csr_spmm(&csr, &wrong),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    let incompatible = CooTensor::from_triplets(4, 4, vec![0], vec![0], vec![1.0]).to_csr();
    assert!(matches!(
        dispatch::csr_spspmm(&csr, &incompatible),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn csr_construction_validates_invariants() {
    // Well-formed data round-trips.
    let csr = CsrTensor::from_csr_data(2, 3, vec![0, 1, 3], vec![2, 0, 1], vec![1.0, 2.0, 3.0]);
    assert_eq!(csr.nnz(), 3);
    let (cols, vals) = csr.row(1);
    assert_eq!(cols, &[0, 1]);
    assert_eq!(vals, &[2.0, 3.0]);
}
