//! Multi-index enumeration and barycentric shape functions on simplices.

use crate::error::{Error, Result};
use crate::tensor::{ITensor, Tensor};
use crate::Real;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

/// Number of local degrees of freedom of the degree-`p` Lagrange basis on a
/// simplex of topological dimension `td`, i.e. `C(p + td, td)`.
pub fn simplex_ldof(p: usize, td: usize) -> usize {
    binomial(p + td, td)
}

fn binomial(n: usize, k: usize) -> usize {
    let k = k.min(n - k);
    let mut result = 1usize;
    for i in 0..k {
        result = result * (n - i) / (i + 1);
    }
    result
}

static MULTI_INDEX_CACHE: OnceLock<RwLock<FxHashMap<(usize, usize), ITensor>>> = OnceLock::new();

/// Enumerates all non-negative `(td + 1)`-tuples summing to `p`.
///
/// Rows are ordered degree-lexicographically with the first coordinate
/// varying slowest (and decreasing), the order downstream dof numbering
/// depends on. The result has shape `(C(p + td, td), td + 1)` and is
/// memoized per `(p, td)`.
pub fn multi_index_matrix(p: usize, td: usize) -> ITensor {
    let cache = MULTI_INDEX_CACHE.get_or_init(Default::default);
    if let Some(mi) = cache.read().get(&(p, td)) {
        return mi.clone();
    }
    let mi = build_multi_index_matrix(p, td);
    cache.write().insert((p, td), mi.clone());
    mi
}

fn build_multi_index_matrix(p: usize, td: usize) -> ITensor {
    let ldof = simplex_ldof(p, td);
    let mut rows = Vec::with_capacity(ldof * (td + 1));
    let mut current = vec![0usize; td + 1];
    fill_descending(0, p, &mut current, &mut rows);
    Tensor::from_data(&[ldof, td + 1], rows)
}

fn fill_descending(pos: usize, remaining: usize, current: &mut [usize], out: &mut Vec<usize>) {
    if pos + 1 == current.len() {
        current[pos] = remaining;
        out.extend_from_slice(current);
        return;
    }
    for value in (0..=remaining).rev() {
        current[pos] = value;
        fill_descending(pos + 1, remaining - value, current, out);
    }
}

struct ShapeArgs<'a> {
    nvc: usize,
    npoints: usize,
    mi: &'a ITensor,
    ldof: usize,
}

fn check_shape_args<'a, T: Real>(
    op: &str,
    bc: &Tensor<T>,
    p: usize,
    mi: Option<&'a ITensor>,
    owned_mi: &'a mut Option<ITensor>,
) -> Result<ShapeArgs<'a>> {
    let nvc = match bc.shape().last() {
        Some(&nvc) if nvc > 0 => nvc,
        _ => {
            return Err(Error::shape_mismatch(
                op,
                "barycentric points of shape (..., TD + 1)",
                format!("{:?}", bc.shape()),
            ))
        }
    };
    let td = nvc - 1;
    let mi = match mi {
        Some(mi) => mi,
        None => &*owned_mi.insert(multi_index_matrix(p, td)),
    };
    if mi.ndim() != 2 || mi.shape()[1] != nvc {
        return Err(Error::shape_mismatch(
            op,
            format!("a multi-index matrix of shape (ldof, {nvc})"),
            format!("{:?}", mi.shape()),
        ));
    }
    Ok(ShapeArgs {
        nvc,
        npoints: bc.len() / nvc,
        ldof: mi.shape()[0],
        mi,
    })
}

/// Inverse factorials `1/k!` for `k = 0..=p`.
fn inverse_factorials<T: Real>(p: usize) -> Vec<T> {
    let mut inv_fact = Vec::with_capacity(p + 1);
    inv_fact.push(T::one());
    for k in 1..=p {
        let k_t = T::from_f64(k as f64).unwrap();
        inv_fact.push(inv_fact[k - 1] / k_t);
    }
    inv_fact
}

/// Evaluates all degree-`p` Lagrange basis functions at the barycentric
/// points `bc` of shape `(..., TD + 1)`, returning values of shape
/// `(..., ldof)`.
///
/// The evaluation builds, per point and barycentric direction, the
/// cumulative products `A_r = (1/r!) prod_{t<r} (p λ − t)` and multiplies
/// the table entries selected by each basis function's multi-index. The
/// values at any valid barycentric point sum to one; `p = 0` yields the
/// constant basis.
pub fn simplex_shape_function<T: Real>(
    bc: &Tensor<T>,
    p: usize,
    mi: Option<&ITensor>,
) -> Result<Tensor<T>> {
    if p == 1 {
        return Ok(bc.clone());
    }
    let mut owned_mi = None;
    let args = check_shape_args("simplex_shape_function", bc, p, mi, &mut owned_mi)?;
    let ShapeArgs {
        nvc,
        npoints,
        mi,
        ldof,
    } = args;

    let p_t = T::from_f64(p as f64).unwrap();
    let inv_fact = inverse_factorials::<T>(p);

    let mut out_shape = bc.shape().to_vec();
    *out_shape.last_mut().unwrap() = ldof;
    let mut out = Vec::with_capacity(npoints * ldof);

    // The product table is owned by this call and refilled per point.
    let mut table = vec![T::one(); (p + 1) * nvc];
    for q in 0..npoints {
        let lambda = &bc.data()[q * nvc..(q + 1) * nvc];
        for (j, &lambda_j) in lambda.iter().enumerate() {
            let mut g = T::one();
            for k in 1..=p {
                g *= p_t * lambda_j - T::from_f64((k - 1) as f64).unwrap();
                table[k * nvc + j] = g * inv_fact[k];
            }
        }
        for row in 0..ldof {
            let mut phi = T::one();
            for j in 0..nvc {
                phi *= table[mi.data()[row * nvc + j] * nvc + j];
            }
            out.push(phi);
        }
    }
    Ok(Tensor::from_data(&out_shape, out))
}

/// Gradients of [`simplex_shape_function`] with respect to the barycentric
/// coordinates, of shape `(..., ldof, TD + 1)`.
///
/// Differentiates the same cumulative-product table with a paired
/// product/sum recurrence (`g_r = g_{r-1} f_r`, `g'_r = g'_{r-1} f_r +
/// p g_{r-1}` for `f_r = p λ − (r − 1)`) and applies the product rule over
/// the `TD + 1` factors of each basis function. Rows sum to zero since the
/// basis functions sum to the constant one.
pub fn simplex_grad_shape_function<T: Real>(
    bc: &Tensor<T>,
    p: usize,
    mi: Option<&ITensor>,
) -> Result<Tensor<T>> {
    let mut owned_mi = None;
    let args = check_shape_args("simplex_grad_shape_function", bc, p, mi, &mut owned_mi)?;
    let ShapeArgs {
        nvc,
        npoints,
        mi,
        ldof,
    } = args;

    let mut out_shape = bc.shape().to_vec();
    *out_shape.last_mut().unwrap() = ldof;
    out_shape.push(nvc);

    if p == 0 {
        // Gradient of the constant basis.
        return Ok(Tensor::zeros(&out_shape));
    }

    let p_t = T::from_f64(p as f64).unwrap();
    let inv_fact = inverse_factorials::<T>(p);

    let mut out = Vec::with_capacity(npoints * ldof * nvc);
    let mut values = vec![T::one(); (p + 1) * nvc];
    let mut derivatives = vec![T::zero(); (p + 1) * nvc];
    for q in 0..npoints {
        let lambda = &bc.data()[q * nvc..(q + 1) * nvc];
        for (j, &lambda_j) in lambda.iter().enumerate() {
            let mut g = T::one();
            let mut dg = T::zero();
            values[j] = T::one();
            derivatives[j] = T::zero();
            for k in 1..=p {
                let factor = p_t * lambda_j - T::from_f64((k - 1) as f64).unwrap();
                dg = dg * factor + g * p_t;
                g *= factor;
                values[k * nvc + j] = g * inv_fact[k];
                derivatives[k * nvc + j] = dg * inv_fact[k];
            }
        }
        for row in 0..ldof {
            let mi_row = &mi.data()[row * nvc..(row + 1) * nvc];
            for i in 0..nvc {
                let mut grad = derivatives[mi_row[i] * nvc + i];
                for (j, &mi_j) in mi_row.iter().enumerate() {
                    if j != i {
                        grad *= values[mi_j * nvc + j];
                    }
                }
                out.push(grad);
            }
        }
    }
    Ok(Tensor::from_data(&out_shape, out))
}
