//! A small einsum evaluator for explicit specifications.
//!
//! Supports any number of operands and any single-character index labels,
//! e.g. `"ijk,qj->iqk"`. The output term is mandatory; implicit-output
//! specifications and ellipses are rejected. Evaluation iterates the full
//! joint index space, which is ample for the contraction sizes the kernels
//! produce.

use crate::error::{Error, Result};
use crate::tensor::{increment_index, row_major_strides, DTensor, Tensor};
use rustc_hash::FxHashMap;

fn spec_error(spec: &str, reason: impl Into<String>) -> Error {
    Error::EinsumSpec {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse(spec: &str) -> Result<(Vec<Vec<char>>, Vec<char>)> {
    let (lhs, rhs) = spec
        .split_once("->")
        .ok_or_else(|| spec_error(spec, "an explicit output term is required"))?;
    let parse_term = |term: &str| -> Result<Vec<char>> {
        let labels: Vec<char> = term.trim().chars().collect();
        if labels.iter().all(|c| c.is_ascii_alphabetic()) {
            Ok(labels)
        } else {
            Err(spec_error(spec, "index labels must be ASCII letters"))
        }
    };
    let inputs = lhs
        .split(',')
        .map(parse_term)
        .collect::<Result<Vec<_>>>()?;
    let output = parse_term(rhs)?;

    let mut seen = Vec::new();
    for &label in &output {
        if seen.contains(&label) {
            return Err(spec_error(spec, format!("duplicate output label `{label}`")));
        }
        if !inputs.iter().any(|term| term.contains(&label)) {
            return Err(spec_error(
                spec,
                format!("output label `{label}` does not appear in any input"),
            ));
        }
        seen.push(label);
    }
    Ok((inputs, output))
}

/// Evaluates `spec` over the given operands.
pub fn einsum(spec: &str, operands: &[&DTensor]) -> Result<DTensor> {
    let (input_terms, output_term) = parse(spec)?;
    if input_terms.len() != operands.len() {
        return Err(spec_error(
            spec,
            format!(
                "specification names {} operands but {} were supplied",
                input_terms.len(),
                operands.len()
            ),
        ));
    }

    // Bind every label to its extent, checking consistency across operands.
    let mut extents: FxHashMap<char, usize> = FxHashMap::default();
    for (term, operand) in input_terms.iter().zip(operands) {
        if term.len() != operand.ndim() {
            return Err(spec_error(
                spec,
                format!(
                    "term `{}` has {} labels but its operand has rank {}",
                    term.iter().collect::<String>(),
                    term.len(),
                    operand.ndim()
                ),
            ));
        }
        for (&label, &dim) in term.iter().zip(operand.shape()) {
            match extents.insert(label, dim) {
                Some(previous) if previous != dim => {
                    return Err(Error::shape_mismatch(
                        "einsum",
                        format!("extent {previous} for label `{label}`"),
                        format!("{dim}"),
                    ));
                }
                _ => {}
            }
        }
    }

    // Joint index space: output labels first, then the summed labels in a
    // deterministic order.
    let mut labels = output_term.clone();
    let mut summed: Vec<char> = extents
        .keys()
        .copied()
        .filter(|label| !output_term.contains(label))
        .collect();
    summed.sort_unstable();
    labels.extend(summed);

    let label_pos: FxHashMap<char, usize> =
        labels.iter().enumerate().map(|(i, &c)| (c, i)).collect();
    let joint_shape: Vec<usize> = labels.iter().map(|label| extents[label]).collect();

    // Per operand: the stride each joint index position contributes.
    let operand_strides: Vec<Vec<(usize, usize)>> = input_terms
        .iter()
        .zip(operands)
        .map(|(term, operand)| {
            let strides = operand.strides();
            term.iter()
                .zip(strides)
                .map(|(label, stride)| (label_pos[label], stride))
                .collect()
        })
        .collect();

    let out_shape: Vec<usize> = output_term.iter().map(|label| extents[label]).collect();
    let out_strides = row_major_strides(&out_shape);
    let mut out = Tensor::zeros(&out_shape);

    if out.is_empty() || joint_shape.iter().any(|&d| d == 0) {
        return Ok(out);
    }

    let mut index = vec![0usize; joint_shape.len()];
    loop {
        let mut term_product = 1.0;
        for (operand, strides) in operands.iter().zip(&operand_strides) {
            let offset: usize = strides.iter().map(|&(pos, stride)| index[pos] * stride).sum();
            term_product *= operand.data()[offset];
        }
        let out_offset: usize = out_strides
            .iter()
            .enumerate()
            .map(|(dim, stride)| index[dim] * stride)
            .sum();
        out.data_mut()[out_offset] += term_product;
        if !increment_index(&mut index, &joint_shape) {
            break;
        }
    }
    Ok(out)
}
