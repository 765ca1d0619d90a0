// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the symkern project.

//! Numerical gradients for checking symbolic ones.

use std::collections::BTreeMap;

use crate::formula::{Formula, Var};

use super::{EvalError, Evaluator};

/// Central differences of a scalar function at `point`.
///
/// ```
/// use symkern::eval::central_difference;
///
/// let f = |v: &[f64]| v[0] * v[0] + 3.0 * v[1];
/// let g = central_difference(f, &[2.0, -1.0], 1e-6);
/// assert!((g[0] - 4.0).abs() < 1e-6);
/// assert!((g[1] - 3.0).abs() < 1e-6);
/// ```
pub fn central_difference<F>(f: F, point: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut perturbed = point.to_vec();
    let mut grads = Vec::with_capacity(point.len());
    for k in 0..point.len() {
        perturbed[k] = point[k] + eps;
        let plus = f(&perturbed);
        perturbed[k] = point[k] - eps;
        let minus = f(&perturbed);
        perturbed[k] = point[k];
        grads.push((plus - minus) / (2.0 * eps));
    }
    grads
}

/// Numerical vector-Jacobian product: the gradient of
/// `⟨upstream, formula⟩` with respect to `var`, at the bindings held by
/// `evaluator`.
pub fn vjp_central_difference(
    evaluator: &Evaluator,
    formula: &Formula,
    var: &Var,
    upstream: &[f64],
    eps: f64,
) -> Result<Vec<f64>, EvalError> {
    if upstream.len() != formula.dim() {
        return Err(EvalError::OutputLength {
            expected: formula.dim(),
            found: upstream.len(),
        });
    }
    formula.collect_variables(&mut BTreeMap::from([(var.index, *var)]))?;
    let point = evaluator
        .binding(var.index)
        .ok_or(EvalError::UnboundVariable { index: var.index })?
        .to_vec();

    let mut shifted = evaluator.clone();
    let mut out = vec![0.0; formula.dim()];
    let mut grads = Vec::with_capacity(point.len());
    let mut perturbed = point.clone();
    for k in 0..point.len() {
        let mut side = |value: f64| -> Result<f64, EvalError> {
            perturbed[k] = value;
            shifted.bind(var.index, perturbed.clone());
            shifted.eval_into(formula, &mut out)?;
            Ok(out.iter().zip(upstream).map(|(y, u)| y * u).sum())
        };
        let plus = side(point[k] + eps)?;
        let minus = side(point[k] - eps)?;
        perturbed[k] = point[k];
        grads.push((plus - minus) / (2.0 * eps));
    }
    Ok(grads)
}

/// Largest absolute componentwise difference. Vectors of different lengths
/// compare as infinitely far apart.
pub fn max_abs_error(lhs: &[f64], rhs: &[f64]) -> f64 {
    if lhs.len() != rhs.len() {
        return f64::INFINITY;
    }
    lhs.iter()
        .zip(rhs)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcendental_derivative() {
        let f = |v: &[f64]| v[0].sin() * v[0].exp();
        let g = central_difference(f, &[1.0], 1e-6);
        let expected = (1.0f64.cos() + 1.0f64.sin()) * 1.0f64.exp();
        assert!((g[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn vjp_of_square() {
        let mut ev = Evaluator::new();
        ev.bind(0, vec![1.5, -2.0]);
        let x = Var::i(0, 2);
        let f = Formula::square(Formula::var(x));
        let g = vjp_central_difference(&ev, &f, &x, &[1.0, 0.5], 1e-6).unwrap();
        assert!(max_abs_error(&g, &[3.0, -2.0]) < 1e-6);
    }

    #[test]
    fn max_abs_error_picks_largest() {
        assert!((max_abs_error(&[1.0, 2.0, 3.0], &[1.1, 2.0, 2.8]) - 0.2).abs() < 1e-12);
        assert!(max_abs_error(&[1.0], &[]).is_infinite());
    }
}
