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

use crate::config::ClampGradient;
use crate::formula::{BinaryNode, BinaryOp, Formula, TensorDotNode, UnaryNode, UnaryOp};

use super::engine::{AutodiffError, GradientOps};

/// Push `upstream` through `node` and return the gradient with respect to
/// the builder's target variable.
pub(super) fn apply_rule(
    ops: &mut impl GradientOps,
    node: &Formula,
    upstream: Formula,
) -> Result<Formula, AutodiffError> {
    match node {
        Formula::Var(var) => {
            if *var == ops.target() {
                Ok(upstream)
            } else {
                Ok(ops.zero())
            }
        }
        Formula::Zero(_) | Formula::Const { .. } => Ok(ops.zero()),
        Formula::Unary(node) => unary_rule(ops, node, upstream),
        Formula::Binary(node) => binary_rule(ops, node, upstream),
        Formula::Sum(arg) => {
            let spread = Formula::broadcast(upstream, arg.dim())?;
            ops.backprop(arg, spread)
        }
        Formula::Broadcast(node) => ops.backprop(node.arg(), Formula::sum(upstream)),
        Formula::TensorDot(node) => tensor_dot_rule(ops, node, upstream),
    }
}

fn unary_rule(
    ops: &mut impl GradientOps,
    node: &UnaryNode,
    g: Formula,
) -> Result<Formula, AutodiffError> {
    let a = node.arg();
    let inner = match node.op() {
        UnaryOp::Minus => ops.neg(g),
        UnaryOp::Square => {
            let two_a = ops.mul(Formula::constant(2.0, a.dim()), a.clone())?;
            ops.mul(two_a, g)?
        }
        UnaryOp::Exp => ops.mul(Formula::exp(a.clone()), g)?,
        UnaryOp::Log => ops.div(g, a.clone())?,
        UnaryOp::Sin => ops.mul(Formula::cos(a.clone()), g)?,
        UnaryOp::Cos => {
            let scaled = ops.mul(Formula::sin(a.clone()), g)?;
            ops.neg(scaled)
        }
        UnaryOp::Clamp11 => match ops.options().clamp_gradient {
            ClampGradient::Scaled => ops.mul(a.clone(), g)?,
            ClampGradient::PassThrough => g,
        },
    };
    ops.backprop(a, inner)
}

fn binary_rule(
    ops: &mut impl GradientOps,
    node: &BinaryNode,
    g: Formula,
) -> Result<Formula, AutodiffError> {
    let (a, b) = (node.lhs(), node.rhs());
    match node.op() {
        BinaryOp::Add => {
            let da = ops.backprop(a, g.clone())?;
            let db = ops.backprop(b, g)?;
            ops.add(da, db)
        }
        BinaryOp::Subtract => {
            let da = ops.backprop(a, g.clone())?;
            let db = ops.backprop(b, g)?;
            ops.sub(da, db)
        }
        BinaryOp::Mult => {
            let ga = ops.mul(b.clone(), g.clone())?;
            let gb = ops.mul(a.clone(), g)?;
            let da = ops.backprop(a, ga)?;
            let db = ops.backprop(b, gb)?;
            ops.add(da, db)
        }
        BinaryOp::Divide => {
            // d(a/b) = da/b - a·db/b²
            let ga = ops.div(g.clone(), b.clone())?;
            let num = ops.mul(a.clone(), g)?;
            let gb = ops.div(num, Formula::square(b.clone()))?;
            let da = ops.backprop(a, ga)?;
            let db = ops.backprop(b, gb)?;
            ops.sub(da, db)
        }
        BinaryOp::Atan2 => {
            // d atan2(a, b) = (b·da - a·db) / (a² + b²)
            let denom = ops.add(Formula::square(a.clone()), Formula::square(b.clone()))?;
            let wa = ops.div(b.clone(), denom.clone())?;
            let wb = ops.div(a.clone(), denom)?;
            let ga = ops.mul(wa, g.clone())?;
            let gb = ops.mul(wb, g)?;
            let da = ops.backprop(a, ga)?;
            let db = ops.backprop(b, gb)?;
            ops.sub(da, db)
        }
    }
}

/// A contraction is one slot of the trilinear form `T(out, a, b)`. The
/// derivative with respect to the child filling slot `s` is the same form
/// solved for `s`, with the upstream gradient in the node's own slot and the
/// other child in the remaining one. All three share the node's index table.
fn tensor_dot_rule(
    ops: &mut impl GradientOps,
    node: &TensorDotNode,
    g: Formula,
) -> Result<Formula, AutodiffError> {
    let [(s0, c0), (s1, c1)] = node.inputs();
    let mut total = ops.zero();
    for ((slot, child), other) in [((s0, c0), c1), ((s1, c1), c0)] {
        if ops.options().simplify && !child.depends_on(&ops.target()) {
            continue;
        }
        let [first, second] = slot.others().map(|filled| {
            if filled == node.target() {
                g.clone()
            } else {
                other.clone()
            }
        });
        let grad = Formula::contraction(node.table().clone(), slot, first, second)?;
        let part = ops.backprop(child, grad)?;
        total = ops.add(total, part)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use crate::autodiff::{differentiate, differentiate_with_options, GradientOptions};
    use crate::config::ClampGradient;
    use crate::formula::{Formula, Var};

    #[test]
    fn atan2_rule_subtracts_partials() {
        let x = Var::i(0, 1);
        let y = Var::j(1, 1);
        let f = Formula::atan2(Formula::var(x), Formula::var(y)).unwrap();
        let g = Formula::constant(1.0, 1);
        let dx = differentiate(&f, &x, g.clone()).unwrap();
        let dy = differentiate(&f, &y, g).unwrap();
        assert_eq!(
            dx.to_string(),
            "Mult(Divide(Var(1,1,1),Add(Square(Var(0,1,0)),Square(Var(1,1,1)))),Const(1.0,1))"
        );
        assert_eq!(
            dy.to_string(),
            "Minus(Mult(Divide(Var(0,1,0),Add(Square(Var(0,1,0)),Square(Var(1,1,1)))),Const(1.0,1)))"
        );
    }

    #[test]
    fn clamp_conventions() {
        let x = Var::i(0, 2);
        let f = Formula::clamp11(Formula::var(x));
        let g = Formula::var(Var::j(9, 2));
        let scaled = differentiate(&f, &x, g.clone()).unwrap();
        assert_eq!(scaled.to_string(), "Mult(Var(0,2,0),Var(9,2,1))");

        let opts = GradientOptions {
            clamp_gradient: ClampGradient::PassThrough,
            ..GradientOptions::default()
        };
        let pass = differentiate_with_options(&f, &x, g.clone(), &opts).unwrap();
        assert_eq!(pass, g);
    }

    #[test]
    fn sum_and_broadcast_swap() {
        let x = Var::i(0, 3);
        let f = Formula::sum(Formula::var(x));
        let g = differentiate(&f, &x, Formula::var(Var::j(1, 1))).unwrap();
        assert_eq!(g.to_string(), "Broadcast(Var(1,1,1),3)");
    }

    #[test]
    fn tensor_dot_gradient_targets_operand_slots() {
        let a = Var::i(0, 6);
        let b = Var::j(1, 3);
        let f = Formula::tensor_dot(
            Formula::var(a),
            Formula::var(b),
            &[2, 3],
            &[3],
            &[1],
            &[0],
        )
        .unwrap();
        let g = Formula::var(Var::param(2, 2));
        let da = differentiate(&f, &a, g.clone()).unwrap();
        let db = differentiate(&f, &b, g).unwrap();
        assert_eq!(da.dim(), 6);
        assert_eq!(db.dim(), 3);
        assert!(da.to_string().starts_with("TensorDotGradA(Var(2,2,2),Var(1,3,1)"));
        assert!(db.to_string().starts_with("TensorDotGradB(Var(2,2,2),Var(0,6,0)"));
    }
}
