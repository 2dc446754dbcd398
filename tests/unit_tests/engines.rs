use super::all_engines;
use bifrost::dispatch;
use bifrost::engine::{BatchedFn, Engine};
use bifrost::linalg::LinalgOps;
use bifrost::{active_engine, select_engine, Error, ScopedEngine, Tensor};
use std::sync::Arc;
use util::assert_approx_tensor_eq;

#[test]
fn engines_agree_on_shape_function_evaluation() {
    let bc = Tensor::from_data(
        &[4, 3],
        vec![
            0.2, 0.3, 0.5, 0.1, 0.1, 0.8, 0.6, 0.2, 0.2, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0,
        ],
    );
    let engines = all_engines();
    let reference = engines[0].simplex_shape_function(&bc, 4, None).unwrap();
    let reference_grad = engines[0]
        .simplex_grad_shape_function(&bc, 4, None)
        .unwrap();
    for engine in &engines[1..] {
        let phi = engine.simplex_shape_function(&bc, 4, None).unwrap();
        assert_approx_tensor_eq!(phi, reference, abstol = 1e-14);
        let grad = engine.simplex_grad_shape_function(&bc, 4, None).unwrap();
        assert_approx_tensor_eq!(grad, reference_grad, abstol = 1e-14);
    }
}

#[test]
fn vmap_doubles_a_stacked_array() {
    let double: BatchedFn = Arc::new(|args| {
        let doubled = args[0].map(|&x| 2.0 * x);
        Ok(vec![doubled])
    });

    let input = Tensor::from_data(&[4, 3], (0..12).map(|i| i as f64).collect::<Vec<_>>());
    for engine in all_engines() {
        let vectorized = engine.vmap(double.clone(), 0, 0).unwrap();
        let outputs = vectorized(std::slice::from_ref(&input)).unwrap();
        assert_eq!(outputs.len(), 1, "{}", engine.name());
        assert_eq!(outputs[0].shape(), &[4, 3]);
        let expected = input.map(|&x| 2.0 * x);
        assert_eq!(outputs[0], expected, "{}", engine.name());
    }
}

#[test]
fn vmap_rejects_mismatched_axes() {
    let identity: BatchedFn = Arc::new(|args| Ok(args.to_vec()));
    for engine in all_engines() {
        match engine.vmap(identity.clone(), 0, 1) {
            Err(Error::VmapAxisMismatch { in_axis, out_axis }) => {
                assert_eq!((in_axis, out_axis), (0, 1));
            }
            Ok(_) => panic!("engine {}: vmap unexpectedly succeeded", engine.name()),
            Err(other) => panic!("engine {}: unexpected {other:?}", engine.name()),
        }
    }
}

#[test]
fn vmap_restacks_tuple_results_per_position() {
    // Returns (sum, doubled slice) per slice; positions restack separately.
    let split: BatchedFn = Arc::new(|args| {
        let slice = &args[0];
        let total: f64 = slice.data().iter().sum();
        Ok(vec![Tensor::from_scalar(total), slice.map(|&x| 2.0 * x)])
    });

    let input = Tensor::from_data(&[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    for engine in all_engines() {
        let vectorized = engine.vmap(split.clone(), 0, 0).unwrap();
        let outputs = vectorized(std::slice::from_ref(&input)).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].shape(), &[3]);
        assert_eq!(outputs[0].data(), &[3.0, 7.0, 11.0]);
        assert_eq!(outputs[1].shape(), &[3, 2]);
    }
}

#[test]
fn vmap_along_inner_axis() {
    // Normalize each column by its own sum; unstacking and restacking along
    // axis 1 must reassemble the original layout.
    let normalize: BatchedFn = Arc::new(|args| {
        let total: f64 = args[0].data().iter().sum();
        Ok(vec![args[0].map(|&x| x / total)])
    });
    let input = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    for engine in all_engines() {
        let vectorized = engine.vmap(normalize.clone(), 1, 1).unwrap();
        let outputs = vectorized(std::slice::from_ref(&input)).unwrap();
        assert_eq!(outputs[0].shape(), &[2, 3]);
        // Column sums were 5, 7, 9.
        let expected = [
            1.0 / 5.0,
            2.0 / 7.0,
            3.0 / 9.0,
            4.0 / 5.0,
            5.0 / 7.0,
            6.0 / 9.0,
        ];
        for (a, b) in outputs[0].data().iter().zip(expected) {
            assert!((a - b).abs() < 1e-14, "{}", engine.name());
        }
    }
}

#[test]
fn concurrent_threads_use_their_own_engine_selection() {
    // Two threads run the same computation under different engine
    // selections; each must see its own engine throughout, regardless of
    // what the other thread switches to mid-flight.
    let worker = |engine_name: &'static str| {
        std::thread::spawn(move || {
            select_engine(engine_name).unwrap();
            let bc = Tensor::from_data(&[1, 3], vec![0.25, 0.25, 0.5]);
            let mut names = Vec::new();
            let mut results = Vec::new();
            for _ in 0..50 {
                names.push(active_engine().name().to_string());
                results.push(dispatch::simplex_shape_function(&bc, 3, None).unwrap());
            }
            (names, results)
        })
    };

    let a = worker("cpu");
    let b = worker("nalgebra");
    let (names_a, results_a) = a.join().unwrap();
    let (names_b, results_b) = b.join().unwrap();

    assert!(names_a.iter().all(|n| n == "cpu"));
    assert!(names_b.iter().all(|n| n == "nalgebra"));
    for (x, y) in results_a.iter().zip(&results_b) {
        assert_approx_tensor_eq!(x, y, abstol = 1e-14);
    }
}

#[test]
fn scoped_selection_composes_with_dispatch() {
    select_engine("cpu").unwrap();
    let result = bifrost::with_engine("parallel", || active_engine().name().to_string()).unwrap();
    assert_eq!(result, "parallel");
    assert_eq!(active_engine().name(), "cpu");

    assert!(matches!(
        ScopedEngine::new("no-such-engine"),
        Err(Error::UnknownEngine(_))
    ));
}

#[test]
fn random_namespace_is_deterministic_per_engine() {
    for name in ["cpu", "parallel", "nalgebra"] {
        let _guard = ScopedEngine::new(name).unwrap();
        dispatch::random::seed(7);
        let first = dispatch::random::normal(&[16]);
        dispatch::random::seed(7);
        let second = dispatch::random::normal(&[16]);
        assert_eq!(first, second, "{name}");
    }
}

#[test]
fn einsum_through_every_engine_matches_matmul() {
    let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let b = Tensor::from_data(&[3, 4], (0..12).map(|i| i as f64).collect::<Vec<_>>());
    for engine in all_engines() {
        let contracted = engine.einsum("ij,jk->ik", &[&a, &b]).unwrap();
        let multiplied = engine.linalg().matmul(&a, &b).unwrap();
        assert_approx_tensor_eq!(contracted, multiplied, abstol = 1e-12);
    }
}

#[test]
fn linalg_namespace_agrees_across_engines() {
    let mats = Tensor::from_data(
        &[2, 3, 3],
        vec![
            2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 4.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0,
            10.0,
        ],
    );
    let reference = all_engines()[0].linalg().det(&mats).unwrap();
    assert_approx_tensor_eq!(
        reference,
        Tensor::from_data(&[2], vec![24.0, -3.0]),
        abstol = 1e-12
    );
    for engine in all_engines() {
        let det = engine.linalg().det(&mats).unwrap();
        assert_approx_tensor_eq!(det, reference, abstol = 1e-12);
    }
}

#[test]
fn creation_surface_through_dispatch() {
    let _guard = ScopedEngine::new("nalgebra").unwrap();
    let id = dispatch::eye(4, None).unwrap();
    assert_eq!(id.shape(), &[4, 4]);
    let trace = dispatch::einsum("ii->", &[&id]).unwrap();
    assert_eq!(trace.data(), &[4.0]);

    let ramp = dispatch::arange(1.0, 2.0, 0.5, None).unwrap();
    assert_eq!(ramp.data(), &[1.0, 1.5]);
}
