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

//! Registry of formula operators.

use crate::formula::{BinaryOp, Formula, FormulaError, UnaryOp};

/// How an operator maps onto formula nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Sum,
    /// Needs a target length besides its child.
    Broadcast,
    /// Needs a contraction spec besides its children.
    TensorDot,
}

/// Fixed metadata for a formula operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSignature {
    /// Name as printed in formula identifiers.
    pub name: &'static str,
    pub kind: OpKind,
    /// Number of child formulas.
    pub arity: usize,
    /// Short description of the forward computation.
    pub summary: &'static str,
    /// The backpropagation rule, with `g` the upstream gradient.
    pub gradient: &'static str,
}

/// Every operator, in a stable order so CLI output stays deterministic.
pub const fn formula_ops() -> &'static [OpSignature] {
    use OpKind::*;
    &[
        OpSignature {
            name: "Minus",
            kind: Unary(UnaryOp::Minus),
            arity: 1,
            summary: "Elementwise negation.",
            gradient: "-g",
        },
        OpSignature {
            name: "Square",
            kind: Unary(UnaryOp::Square),
            arity: 1,
            summary: "Elementwise square.",
            gradient: "2·A·g",
        },
        OpSignature {
            name: "Exp",
            kind: Unary(UnaryOp::Exp),
            arity: 1,
            summary: "Elementwise exponential.",
            gradient: "exp(A)·g",
        },
        OpSignature {
            name: "Log",
            kind: Unary(UnaryOp::Log),
            arity: 1,
            summary: "Elementwise natural logarithm.",
            gradient: "g / A",
        },
        OpSignature {
            name: "Sin",
            kind: Unary(UnaryOp::Sin),
            arity: 1,
            summary: "Elementwise sine.",
            gradient: "cos(A)·g",
        },
        OpSignature {
            name: "Cos",
            kind: Unary(UnaryOp::Cos),
            arity: 1,
            summary: "Elementwise cosine.",
            gradient: "-sin(A)·g",
        },
        OpSignature {
            name: "Clamp11",
            kind: Unary(UnaryOp::Clamp11),
            arity: 1,
            summary: "Elementwise clamp into [-1, 1].",
            gradient: "A·g (scaled) or g (pass-through)",
        },
        OpSignature {
            name: "Add",
            kind: Binary(BinaryOp::Add),
            arity: 2,
            summary: "Elementwise sum of equal-length operands.",
            gradient: "g into A, g into B",
        },
        OpSignature {
            name: "Subtract",
            kind: Binary(BinaryOp::Subtract),
            arity: 2,
            summary: "Elementwise difference of equal-length operands.",
            gradient: "g into A, -g into B",
        },
        OpSignature {
            name: "Mult",
            kind: Binary(BinaryOp::Mult),
            arity: 2,
            summary: "Elementwise product of equal-length operands.",
            gradient: "B·g into A, A·g into B",
        },
        OpSignature {
            name: "Divide",
            kind: Binary(BinaryOp::Divide),
            arity: 2,
            summary: "Elementwise quotient of equal-length operands.",
            gradient: "g/B into A, -A·g/B² into B",
        },
        OpSignature {
            name: "Atan2",
            kind: Binary(BinaryOp::Atan2),
            arity: 2,
            summary: "Elementwise atan2(A, B) of equal-length operands.",
            gradient: "B/(A²+B²)·g into A, -A/(A²+B²)·g into B",
        },
        OpSignature {
            name: "Sum",
            kind: Sum,
            arity: 1,
            summary: "Sum of all components, length 1.",
            gradient: "Broadcast(g)",
        },
        OpSignature {
            name: "Broadcast",
            kind: Broadcast,
            arity: 1,
            summary: "Repeat a length-1 operand to a given length.",
            gradient: "Sum(g)",
        },
        OpSignature {
            name: "TensorDot",
            kind: TensorDot,
            arity: 2,
            summary: "Contraction of two flattened tensors through an index table.",
            gradient: "contraction of g with the other operand",
        },
    ]
}

/// Returns true if `name` names an operator (case-insensitive).
pub fn is_formula_op(name: &str) -> bool {
    op_signature(name).is_some()
}

/// Looks up operator metadata by name, ignoring ASCII case.
pub fn op_signature(name: &str) -> Option<&'static OpSignature> {
    formula_ops()
        .iter()
        .find(|op| op.name.eq_ignore_ascii_case(name))
}

/// Build a node of a parameterless operator from its children.
///
/// `Broadcast` and `TensorDot` need more than their children and are
/// rejected here; use [`Formula::broadcast`] and [`Formula::tensor_dot`].
pub fn instantiate(name: &str, mut args: Vec<Formula>) -> Result<Formula, FormulaError> {
    let unknown = |args: usize| FormulaError::UnknownOperator {
        name: name.to_string(),
        args,
    };
    let sig = op_signature(name).ok_or_else(|| unknown(args.len()))?;
    if args.len() != sig.arity {
        return Err(unknown(args.len()));
    }
    match sig.kind {
        OpKind::Unary(op) => match args.pop() {
            Some(arg) => Ok(Formula::unary(op, arg)),
            None => Err(unknown(0)),
        },
        OpKind::Binary(op) => {
            let rhs = args.pop();
            let lhs = args.pop();
            match (lhs, rhs) {
                (Some(lhs), Some(rhs)) => Formula::binary(op, lhs, rhs),
                _ => Err(unknown(args.len())),
            }
        }
        OpKind::Sum => match args.pop() {
            Some(arg) => Ok(Formula::sum(arg)),
            None => Err(unknown(0)),
        },
        OpKind::Broadcast | OpKind::TensorDot => Err(unknown(args.len())),
    }
}
