//! Vectorizing-map construction shared by the engines.

use crate::error::{Error, Result};
use crate::tensor::{DTensor, Tensor};
use rayon::prelude::*;
use std::sync::Arc;

/// A function over tensors with tuple-valued results, the shape `vmap`
/// wraps and returns.
pub type BatchedFn = Arc<dyn Fn(&[DTensor]) -> Result<Vec<DTensor>> + Send + Sync>;

/// Builds the vectorized form of `func`.
///
/// Every argument is unstacked along `in_axis`, `func` is applied to each
/// slice tuple independently, and each result position is restacked along
/// the same axis. Only `in_axis == out_axis` is supported; a mismatch is a
/// configuration error, not a reinterpretation.
pub(crate) fn build(
    func: BatchedFn,
    in_axis: usize,
    out_axis: usize,
    parallel: bool,
) -> Result<BatchedFn> {
    if in_axis != out_axis {
        return Err(Error::VmapAxisMismatch { in_axis, out_axis });
    }
    let axis = in_axis;

    Ok(Arc::new(move |args: &[DTensor]| {
        if args.is_empty() {
            return Err(Error::shape_mismatch(
                "vmap",
                "at least one argument",
                "an empty argument list",
            ));
        }
        let mut extent = None;
        for arg in args {
            if axis >= arg.ndim() {
                return Err(Error::InvalidAxis {
                    op: "vmap".to_string(),
                    axis,
                    ndim: arg.ndim(),
                });
            }
            match (extent, arg.shape()[axis]) {
                (None, e) => extent = Some(e),
                (Some(prev), e) if prev != e => {
                    return Err(Error::shape_mismatch(
                        "vmap",
                        format!("extent {prev} along axis {axis} for every argument"),
                        format!("{e}"),
                    ));
                }
                _ => {}
            }
        }
        let extent = extent.unwrap();

        let per_arg_slices: Vec<Vec<DTensor>> = args
            .iter()
            .map(|arg| arg.unstack(axis))
            .collect::<Result<_>>()?;
        let call_one = |i: usize| -> Result<Vec<DTensor>> {
            let item: Vec<DTensor> = per_arg_slices
                .iter()
                .map(|slices| slices[i].clone())
                .collect();
            func(&item)
        };
        let results: Vec<Vec<DTensor>> = if parallel {
            (0..extent)
                .into_par_iter()
                .map(call_one)
                .collect::<Result<_>>()?
        } else {
            (0..extent).map(call_one).collect::<Result<_>>()?
        };

        // Restack each tuple position independently.
        let positions = results.first().map(|r| r.len()).unwrap_or(0);
        if results.iter().any(|r| r.len() != positions) {
            return Err(Error::shape_mismatch(
                "vmap",
                "the same number of results for every slice",
                "a varying number of results",
            ));
        }
        (0..positions)
            .map(|pos| {
                let parts: Vec<DTensor> = results.iter().map(|r| r[pos].clone()).collect();
                Tensor::stack(&parts, axis)
            })
            .collect()
    }))
}
