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

use std::fmt;

use crate::tensordot::Slot;

use super::{Formula, Var};

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Var({},{},{})", self.index, self.dim, self.category.code())
    }
}

/// Stable, human-readable identifier of a formula. Two formulas print the
/// same string exactly when they are structurally equal.
impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Var(var) => write!(f, "{var}"),
            Formula::Zero(dim) => write!(f, "Zero({dim})"),
            Formula::Const { value, dim } => write!(f, "Const({value:?},{dim})"),
            Formula::Unary(node) => write!(f, "{}({})", node.op.name(), node.arg),
            Formula::Binary(node) => {
                write!(f, "{}({},{})", node.op.name(), node.lhs, node.rhs)
            }
            Formula::Sum(arg) => write!(f, "Sum({arg})"),
            Formula::Broadcast(node) => write!(f, "Broadcast({},{})", node.arg, node.dim),
            Formula::TensorDot(node) => {
                let name = match node.target {
                    Slot::Out => "TensorDot",
                    Slot::A => "TensorDotGradA",
                    Slot::B => "TensorDotGradB",
                };
                write!(
                    f,
                    "{name}({},{},{})",
                    node.first,
                    node.second,
                    node.table.spec()
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_print_compactly() {
        assert_eq!(Var::param(2, 1).to_string(), "Var(2,1,2)");
        assert_eq!(Formula::zero(3).to_string(), "Zero(3)");
        assert_eq!(Formula::constant(2.0, 1).to_string(), "Const(2.0,1)");
    }

    #[test]
    fn nested_nodes_print_prefix_form() {
        let x = Formula::var(Var::i(0, 1));
        let f = Formula::broadcast(Formula::sum(Formula::clamp11(x)), 4).unwrap();
        assert_eq!(f.to_string(), "Broadcast(Sum(Clamp11(Var(0,1,0))),4)");
    }

    #[test]
    fn contraction_prints_its_spec() {
        let a = Formula::var(Var::i(0, 6));
        let b = Formula::var(Var::j(1, 3));
        let f = Formula::tensor_dot(a, b, &[2, 3], &[3], &[1], &[0]).unwrap();
        assert_eq!(
            f.to_string(),
            "TensorDot(Var(0,6,0),Var(1,3,1),[2, 3],[3],[1],[0])"
        );
    }
}
