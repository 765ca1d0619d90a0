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

#![cfg(feature = "autodiff")]

use symkern::autodiff::{
    differentiate, differentiate_with_options, AutodiffError, GradientOptions,
};
use symkern::eval::{max_abs_error, vjp_central_difference, EvalError, Evaluator};
use symkern::formula::{Formula, FormulaError, Var};
use symkern::ClampGradient;

const UPSTREAM: usize = 9;

fn x(dim: usize) -> Var {
    Var::i(0, dim)
}

fn y(dim: usize) -> Var {
    Var::j(1, dim)
}

fn evaluator(xs: &[f64], ys: &[f64], upstream: &[f64]) -> Evaluator {
    let mut ev = Evaluator::new();
    ev.bind(0, xs.to_vec())
        .bind(1, ys.to_vec())
        .bind(UPSTREAM, upstream.to_vec());
    ev
}

/// Symbolic vector-Jacobian product of `f` against central differences.
fn check_gradient(f: &Formula, var: &Var, ev: &Evaluator) {
    let upstream = Formula::var(Var::param(UPSTREAM, f.dim()));
    let grad = differentiate(f, var, upstream).expect("differentiate");
    assert_eq!(grad.dim(), var.dim, "gradient of {f} has wrong length");
    let symbolic = ev.eval(&grad).expect("evaluate gradient");
    let seed = ev.binding(UPSTREAM).expect("upstream bound").to_vec();
    let numeric = vjp_central_difference(ev, f, var, &seed, 1e-6).expect("finite differences");
    let err = max_abs_error(&symbolic, &numeric);
    assert!(
        err < 1e-6,
        "{f} d/d{var}: symbolic {symbolic:?} vs numeric {numeric:?}"
    );
}

#[test]
fn unary_rules_match_finite_differences() {
    let ev = evaluator(&[0.4, 0.9, 1.6], &[0.0; 3], &[1.0, -0.5, 2.0]);
    let v = Formula::var(x(3));
    for f in [
        Formula::minus(v.clone()),
        Formula::square(v.clone()),
        Formula::exp(v.clone()),
        Formula::log(v.clone()),
        Formula::sin(v.clone()),
        Formula::cos(v.clone()),
    ] {
        check_gradient(&f, &x(3), &ev);
    }
}

#[test]
fn binary_rules_match_finite_differences() {
    let ev = evaluator(&[0.7, -1.2], &[1.5, 0.4], &[0.3, 1.1]);
    let a = Formula::var(x(2));
    let b = Formula::var(y(2));
    for f in [
        Formula::add(a.clone(), b.clone()).unwrap(),
        Formula::subtract(a.clone(), b.clone()).unwrap(),
        Formula::mult(a.clone(), b.clone()).unwrap(),
        Formula::divide(a.clone(), b.clone()).unwrap(),
        Formula::atan2(a.clone(), b.clone()).unwrap(),
    ] {
        check_gradient(&f, &x(2), &ev);
        check_gradient(&f, &y(2), &ev);
    }
}

#[test]
fn atan2_at_sampled_points() {
    for (px, py) in [(1.0, 2.0), (-3.0, 0.5), (0.2, -0.9), (-1.0, -1.0), (4.0, 0.0)] {
        let ev = evaluator(&[px], &[py], &[1.0]);
        let f = Formula::atan2(Formula::var(x(1)), Formula::var(y(1))).unwrap();
        check_gradient(&f, &x(1), &ev);
        check_gradient(&f, &y(1), &ev);
    }
}

#[test]
fn atan2_partial_in_b_is_negative_for_positive_a() {
    let ev = evaluator(&[1.0], &[1.0], &[1.0]);
    let f = Formula::atan2(Formula::var(x(1)), Formula::var(y(1))).unwrap();
    let grad = differentiate(&f, &y(1), Formula::constant(1.0, 1)).unwrap();
    let value = ev.eval(&grad).unwrap();
    assert!((value[0] + 0.5).abs() < 1e-15);
}

#[test]
fn sum_and_broadcast_are_adjoint() {
    let ev = evaluator(&[0.5, 1.5, -2.0], &[0.0; 3], &[0.7, 0.1, -0.4]);
    let s = Formula::sum(Formula::var(x(3)));
    let f = Formula::broadcast(Formula::square(s), 3).unwrap();
    check_gradient(&f, &x(3), &ev);
}

#[test]
fn clamp_follows_configured_convention() {
    let xs = [0.5, -2.0, 3.0];
    let gs = [1.0, 2.0, -1.0];
    let ev = evaluator(&xs, &[0.0; 3], &gs);
    let f = Formula::clamp11(Formula::var(x(3)));
    let upstream = Formula::var(Var::param(UPSTREAM, 3));

    let scaled = differentiate(&f, &x(3), upstream.clone()).unwrap();
    assert_eq!(ev.eval(&scaled).unwrap(), vec![0.5, -4.0, -3.0]);

    let opts = GradientOptions {
        clamp_gradient: ClampGradient::PassThrough,
        ..GradientOptions::default()
    };
    let pass = differentiate_with_options(&f, &x(3), upstream, &opts).unwrap();
    assert_eq!(ev.eval(&pass).unwrap(), gs.to_vec());
}

#[test]
fn tensor_dot_gradients_match_finite_differences() {
    let _ = env_logger::builder().is_test(true).try_init();
    let a = [4.4, 5.4, 6.2, 6.5, 7.5, 6.1, 8.7, 1.3];
    let b = [1.4, 1.2, 1.5, 1.22];
    let g = [0.5, -1.0, 0.25, 2.0, -0.75, 1.5, 0.1, -0.2];
    let ev = evaluator(&a, &b, &g);
    let f = Formula::tensor_dot(
        Formula::var(x(8)),
        Formula::var(y(4)),
        &[2, 2, 2],
        &[2, 2],
        &[2],
        &[0],
    )
    .unwrap();
    check_gradient(&f, &x(8), &ev);
    check_gradient(&f, &y(4), &ev);
}

#[test]
fn tensor_dot_of_shared_operand() {
    // x · x over a full contraction is |x|², gradient 2x·g.
    let ev = evaluator(&[1.0, -2.0, 0.5, 3.0], &[], &[1.5]);
    let f = Formula::tensor_dot(
        Formula::var(x(4)),
        Formula::var(x(4)),
        &[4],
        &[4],
        &[0],
        &[0],
    )
    .unwrap();
    check_gradient(&f, &x(4), &ev);
}

#[test]
fn second_order_keeps_variable_length() {
    let f = Formula::atan2(
        Formula::square(Formula::var(x(3))),
        Formula::exp(Formula::var(y(3))),
    )
    .unwrap();
    let once = differentiate(&f, &x(3), Formula::constant(1.0, 3)).unwrap();
    assert_eq!(once.dim(), 3);
    let twice = differentiate(&once, &x(3), Formula::constant(1.0, 3)).unwrap();
    assert_eq!(twice.dim(), 3);

    let mixed = differentiate(&once, &y(3), Formula::constant(1.0, 3)).unwrap();
    assert_eq!(mixed.dim(), 3);
}

#[test]
fn one_argument_index_names_one_variable() {
    // Var::i(0, 1) and Var::j(0, 1) would share buffer 0 in the evaluator.
    let f = Formula::mult(Formula::var(Var::i(0, 1)), Formula::var(Var::j(0, 1))).unwrap();
    let conflict = FormulaError::ConflictingVariable {
        first: Var::i(0, 1),
        second: Var::j(0, 1),
    };
    assert_eq!(
        differentiate(&f, &Var::i(0, 1), Formula::constant(1.0, 1)).unwrap_err(),
        AutodiffError::Formula(conflict.clone())
    );

    let ev = evaluator(&[3.0], &[], &[1.0]);
    assert_eq!(
        vjp_central_difference(&ev, &f, &Var::i(0, 1), &[1.0], 1e-6).unwrap_err(),
        EvalError::Formula(conflict)
    );
}

#[test]
fn target_and_upstream_must_agree_with_the_formula() {
    let f = Formula::exp(Formula::var(x(2)));
    let err = differentiate(&f, &Var::j(0, 2), Formula::constant(1.0, 2)).unwrap_err();
    assert!(matches!(
        err,
        AutodiffError::Formula(FormulaError::ConflictingVariable { .. })
    ));

    let upstream = Formula::var(Var::param(0, 2));
    let err = differentiate(&f, &x(2), upstream).unwrap_err();
    assert_eq!(
        err,
        AutodiffError::Formula(FormulaError::ConflictingVariable {
            first: x(2),
            second: Var::param(0, 2),
        })
    );
}

#[test]
fn second_derivative_of_sine() {
    let ev = evaluator(&[0.3], &[], &[]);
    let f = Formula::sin(Formula::var(x(1)));
    let once = differentiate(&f, &x(1), Formula::constant(1.0, 1)).unwrap();
    let twice = differentiate(&once, &x(1), Formula::constant(1.0, 1)).unwrap();
    let got = ev.eval(&twice).unwrap();
    assert!((got[0] + 0.3f64.sin()).abs() < 1e-15);
}

#[test]
fn second_order_through_tensor_dot() {
    let f = Formula::tensor_dot(
        Formula::var(x(6)),
        Formula::var(y(6)),
        &[2, 3],
        &[3, 2],
        &[1],
        &[0],
    )
    .unwrap();
    let da = differentiate(&f, &x(6), Formula::var(Var::param(UPSTREAM, 4))).unwrap();
    assert_eq!(da.dim(), 6);
    // da is linear in y, so differentiating in y again is well formed.
    let dab = differentiate(&da, &y(6), Formula::constant(1.0, 6)).unwrap();
    assert_eq!(dab.dim(), 6);
    assert!(dab.to_string().starts_with("TensorDotGradB("));
}

#[test]
fn differentiation_is_deterministic() {
    let f = Formula::mult(
        Formula::clamp11(Formula::var(x(2))),
        Formula::atan2(Formula::var(x(2)), Formula::var(y(2))).unwrap(),
    )
    .unwrap();
    let one = differentiate(&f, &x(2), Formula::constant(1.0, 2)).unwrap();
    let two = differentiate(&f, &x(2), Formula::constant(1.0, 2)).unwrap();
    assert_eq!(format!("{one}"), format!("{two}"));
    assert_eq!(one, two);
}

#[test]
fn differentiation_leaves_input_untouched() {
    let f = Formula::exp(Formula::var(x(2)));
    let before = f.clone();
    let _ = differentiate(&f, &x(2), Formula::constant(1.0, 2)).unwrap();
    assert_eq!(f, before);
}
