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

//! Numeric oracle for the contraction algebra and the derivative rules.
//!
//! Each case computes the same quantity twice, once through the library and
//! once by a direct reference computation, and compares the two vectors
//! under a tolerance.

use log::debug;

use crate::eval::{max_abs_error, Evaluator};
use crate::formula::{Formula, Var};
use crate::shapes;
use crate::tensordot::{cached_index_table, ContractionSpec};

#[cfg(feature = "autodiff")]
use crate::autodiff::differentiate;
#[cfg(feature = "autodiff")]
use crate::eval::{central_difference, vjp_central_difference};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConformanceProfile {
    /// Contraction cases only.
    Contraction,
    /// Contraction cases plus gradient checks (when built with `autodiff`).
    Full,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConformanceOptions {
    pub profile: ConformanceProfile,
    /// Allowed deviation for contraction cases.
    pub tolerance: f64,
    /// Allowed deviation between symbolic and finite-difference gradients.
    pub gradient_tolerance: f64,
}

impl Default for ConformanceOptions {
    fn default() -> Self {
        Self {
            profile: ConformanceProfile::Full,
            tolerance: 1e-12,
            gradient_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("conformance failures: {0:?}")]
pub struct ConformanceFailure(pub Vec<String>);

/// Outcome of one case: both result vectors and their distance.
#[derive(Clone, Debug, PartialEq)]
pub struct CaseReport {
    pub name: String,
    /// Reference result.
    pub expected: Vec<f64>,
    /// Library result.
    pub actual: Vec<f64>,
    pub max_error: f64,
    pub tolerance: f64,
    /// Set when the case could not be computed at all.
    pub error: Option<String>,
}

impl CaseReport {
    fn compared(name: impl Into<String>, expected: Vec<f64>, actual: Vec<f64>, tolerance: f64) -> Self {
        let max_error = max_abs_error(&expected, &actual);
        Self {
            name: name.into(),
            expected,
            actual,
            max_error,
            tolerance,
            error: None,
        }
    }

    fn failed(name: impl Into<String>, error: String) -> Self {
        Self {
            name: name.into(),
            expected: Vec::new(),
            actual: Vec::new(),
            max_error: f64::INFINITY,
            tolerance: 0.0,
            error: Some(error),
        }
    }

    pub fn passed(&self) -> bool {
        self.error.is_none() && self.max_error <= self.tolerance
    }
}

/// Operand values of the fixed 2x2x2 by 2x2 scenario.
pub const SCENARIO_A: [f64; 8] = [4.4, 5.4, 6.2, 6.5, 7.5, 6.1, 8.7, 1.3];
pub const SCENARIO_B: [f64; 4] = [1.4, 1.2, 1.5, 1.22];

/// Run every case of the profile and return all reports, passing or not.
pub fn conformance_report(opts: &ConformanceOptions) -> Vec<CaseReport> {
    #[cfg_attr(not(feature = "autodiff"), allow(unused_mut))]
    let mut reports = vec![
        scenario_via_formula(opts.tolerance),
        scenario_via_table(opts.tolerance),
        matmul_case(opts.tolerance),
    ];

    #[cfg(feature = "autodiff")]
    if matches!(opts.profile, ConformanceProfile::Full) {
        for &(x, y) in ATAN2_POINTS {
            reports.push(atan2_gradient_case(x, y, opts.gradient_tolerance));
        }
        reports.push(tensor_dot_gradient_case(opts.gradient_tolerance));
    }

    for report in &reports {
        debug!(
            "conformance case {}: max error {:e} (tolerance {:e})",
            report.name, report.max_error, report.tolerance
        );
    }
    reports
}

/// Run every case and fail if any of them deviates beyond its tolerance.
pub fn run_conformance(opts: ConformanceOptions) -> Result<Vec<CaseReport>, ConformanceFailure> {
    let reports = conformance_report(&opts);
    let failures: Vec<String> = reports
        .iter()
        .filter(|report| !report.passed())
        .map(|report| match &report.error {
            Some(err) => format!("{} => {err}", report.name),
            None => format!(
                "{} => max error {:e} exceeds {:e}",
                report.name, report.max_error, report.tolerance
            ),
        })
        .collect();
    if failures.is_empty() {
        Ok(reports)
    } else {
        Err(ConformanceFailure(failures))
    }
}

/// The scenario's contraction written out as four literal loops.
fn scenario_nested_loops(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; 8];
    for i in 0..2 {
        for j in 0..2 {
            for k in 0..2 {
                for l in 0..2 {
                    out[4 * i + 2 * j + k] += a[4 * i + 2 * j + l] * b[2 * l + k];
                }
            }
        }
    }
    out
}

fn scenario_via_formula(tolerance: f64) -> CaseReport {
    const NAME: &str = "tensordot-2x2x2-2x2/formula";
    let run = || -> Result<Vec<f64>, String> {
        let a = Formula::var(Var::i(0, 8));
        let b = Formula::var(Var::j(1, 4));
        let f = Formula::tensor_dot(a, b, &[2, 2, 2], &[2, 2], &[2], &[0])
            .map_err(|err| err.to_string())?;
        let mut ev = Evaluator::new();
        ev.bind(0, SCENARIO_A).bind(1, SCENARIO_B);
        ev.eval(&f).map_err(|err| err.to_string())
    };
    match run() {
        Ok(actual) => CaseReport::compared(
            NAME,
            scenario_nested_loops(&SCENARIO_A, &SCENARIO_B),
            actual,
            tolerance,
        ),
        Err(err) => CaseReport::failed(NAME, err),
    }
}

fn scenario_via_table(tolerance: f64) -> CaseReport {
    const NAME: &str = "tensordot-2x2x2-2x2/table";
    let table = match ContractionSpec::new(vec![2, 2, 2], vec![2, 2], vec![2], vec![0])
        .and_then(|spec| cached_index_table(&spec))
    {
        Ok(table) => table,
        Err(err) => return CaseReport::failed(NAME, err.to_string()),
    };
    let mut actual = vec![0.0; table.dimout()];
    table.contract(&SCENARIO_A, &SCENARIO_B, &mut actual);
    CaseReport::compared(
        NAME,
        scenario_nested_loops(&SCENARIO_A, &SCENARIO_B),
        actual,
        tolerance,
    )
}

fn matmul_case(tolerance: f64) -> CaseReport {
    const NAME: &str = "tensordot-matmul-3x4-4x2";
    let spec = match ContractionSpec::new(vec![3, 4], vec![4, 2], vec![1], vec![0]) {
        Ok(spec) => spec,
        Err(err) => return CaseReport::failed(NAME, err.to_string()),
    };
    let a: Vec<f64> = (0..12).map(|n| f64::from(n) * 0.5 - 2.0).collect();
    let b: Vec<f64> = (0..8).map(|n| 1.0 / f64::from(n + 1)).collect();
    let expected = naive_tensordot(&spec, &a, &b);

    let run = || -> Result<Vec<f64>, String> {
        let f = Formula::tensor_dot_with(
            Formula::var(Var::i(0, 12)),
            Formula::var(Var::j(1, 8)),
            spec.clone(),
            &Default::default(),
        )
        .map_err(|err| err.to_string())?;
        let mut ev = Evaluator::new();
        ev.bind(0, a.clone()).bind(1, b.clone());
        ev.eval(&f).map_err(|err| err.to_string())
    };
    match run() {
        Ok(actual) => CaseReport::compared(NAME, expected, actual, tolerance),
        Err(err) => CaseReport::failed(NAME, err),
    }
}

#[cfg(feature = "autodiff")]
const ATAN2_POINTS: &[(f64, f64)] = &[(1.0, 2.0), (-0.5, 0.3), (2.0, -1.5), (0.1, -0.7)];

/// Symbolic `∂atan2(x, y)/∂(x, y)` against central differences.
#[cfg(feature = "autodiff")]
fn atan2_gradient_case(x: f64, y: f64, tolerance: f64) -> CaseReport {
    let name = format!("atan2-grad/({x},{y})");
    let vx = Var::i(0, 1);
    let vy = Var::j(1, 1);
    let run = || -> Result<Vec<f64>, String> {
        let f = Formula::atan2(Formula::var(vx), Formula::var(vy)).map_err(|err| err.to_string())?;
        let mut ev = Evaluator::new();
        ev.bind(0, [x]).bind(1, [y]);
        let mut grads = Vec::with_capacity(2);
        for var in [vx, vy] {
            let g = differentiate(&f, &var, Formula::constant(1.0, 1))
                .map_err(|err| err.to_string())?;
            grads.extend(ev.eval(&g).map_err(|err| err.to_string())?);
        }
        Ok(grads)
    };
    match run() {
        Ok(actual) => {
            let expected = central_difference(|p: &[f64]| p[0].atan2(p[1]), &[x, y], 1e-6);
            CaseReport::compared(name, expected, actual, tolerance)
        }
        Err(err) => CaseReport::failed(name, err),
    }
}

/// Gradient of the scenario contraction with respect to A, checked as a
/// vector-Jacobian product against central differences.
#[cfg(feature = "autodiff")]
fn tensor_dot_gradient_case(tolerance: f64) -> CaseReport {
    const NAME: &str = "tensordot-2x2x2-2x2/grad-a";
    let va = Var::i(0, 8);
    let vb = Var::j(1, 4);
    let vg = Var::param(2, 4);
    let upstream = [0.3, -1.0, 2.0, 0.5];
    let run = || -> Result<(Vec<f64>, Vec<f64>), String> {
        let f = Formula::tensor_dot(
            Formula::var(va),
            Formula::var(vb),
            &[2, 2, 2],
            &[2, 2],
            &[2],
            &[0],
        )
        .map_err(|err| err.to_string())?;
        let grad = differentiate(&f, &va, Formula::var(vg)).map_err(|err| err.to_string())?;
        let mut ev = Evaluator::new();
        ev.bind(0, SCENARIO_A).bind(1, SCENARIO_B).bind(2, upstream);
        let actual = ev.eval(&grad).map_err(|err| err.to_string())?;
        let expected =
            vjp_central_difference(&ev, &f, &va, &upstream, 1e-6).map_err(|err| err.to_string())?;
        Ok((expected, actual))
    };
    match run() {
        Ok((expected, actual)) => CaseReport::compared(NAME, expected, actual, tolerance),
        Err(err) => CaseReport::failed(NAME, err),
    }
}

/// Plain row-major einsum of `a` and `b` over `spec`, with the output laid
/// out as `keepA` axes then `keepB` axes, each in ascending order.
///
/// This agrees with the index table exactly when
/// [`ContractionSpec::is_canonical_layout`] holds.
///
/// # Panics
///
/// Panics if `a` or `b` is shorter than its operand's element count.
pub fn naive_tensordot(spec: &ContractionSpec, a: &[f64], b: &[f64]) -> Vec<f64> {
    let part = spec.partition();
    let strides_a = shapes::row_major_strides(spec.dims_a());
    let strides_b = shapes::row_major_strides(spec.dims_b());
    let out_shape = part.output_shape();
    let n_cont = shapes::num_elements(&part.contracted_dims);

    let mut out = vec![0.0; shapes::num_elements(&out_shape)];
    let mut out_idx = vec![0; out_shape.len()];
    let mut cont_idx = vec![0; part.contracted_dims.len()];
    let mut idx_a = vec![0; spec.dims_a().len()];
    let mut idx_b = vec![0; spec.dims_b().len()];

    for (o, cell) in out.iter_mut().enumerate() {
        shapes::unravel_index(o, &out_shape, &mut out_idx);
        let (kept_a, kept_b) = out_idx.split_at(part.keep_a.len());
        for (&axis, &i) in part.keep_a.iter().zip(kept_a) {
            idx_a[axis] = i;
        }
        for (&axis, &i) in part.keep_b.iter().zip(kept_b) {
            idx_b[axis] = i;
        }
        for c in 0..n_cont {
            shapes::unravel_index(c, &part.contracted_dims, &mut cont_idx);
            for ((&axis_a, &axis_b), &i) in spec.cont_a().iter().zip(spec.cont_b()).zip(&cont_idx) {
                idx_a[axis_a] = i;
                idx_b[axis_b] = i;
            }
            *cell += a[shapes::ravel_index(&idx_a, &strides_a)]
                * b[shapes::ravel_index(&idx_b, &strides_b)];
        }
    }
    out
}
