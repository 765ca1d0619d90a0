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

//! Formula trees.
//!
//! A [`Formula`] is an immutable expression producing a fixed-length vector,
//! computed elementwise from its children. Composite nodes own their children
//! exclusively; leaves ([`Var`], zeros, constants) are plain values and can be
//! copied into as many parents as needed.
//!
//! Output lengths are checked when a node is built, so a malformed formula
//! never exists:
//!
//! ```
//! use symkern::formula::{Formula, Var};
//!
//! let x = Formula::var(Var::i(0, 3));
//! let y = Formula::var(Var::j(1, 3));
//! let f = Formula::atan2(x, y).unwrap();
//! assert_eq!(f.dim(), 3);
//! assert_eq!(f.to_string(), "Atan2(Var(0,3,0),Var(1,3,1))");
//!
//! let bad = Formula::atan2(Formula::var(Var::i(0, 3)), Formula::var(Var::j(1, 2)));
//! assert!(bad.is_err());
//! ```

mod print;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::TensorDotOptions;
use crate::tensordot::{cached_index_table, ContractionError, ContractionSpec, IndexTable, Slot};

/// Construction-time failures of formula nodes.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FormulaError {
    /// A same-length binary operator received children of different lengths.
    #[error("operand lengths differ for {op}: {lhs} vs {rhs}")]
    LengthMismatch {
        op: &'static str,
        lhs: usize,
        rhs: usize,
    },
    /// An operand does not have the length the operator requires.
    #[error("{op} expects an operand of length {expected}, found {found}")]
    OperandLength {
        op: &'static str,
        expected: usize,
        found: usize,
    },
    /// The operator name is not in the registry or takes a different number
    /// of arguments.
    #[error("cannot instantiate operator `{name}` with {args} argument(s)")]
    UnknownOperator { name: String, args: usize },
    #[error("invalid contraction: {0}")]
    Contraction(#[from] ContractionError),
    /// Two leaves name the same argument index with different lengths or
    /// categories.
    #[error("argument {} is used both as {first} and as {second}", .first.index)]
    ConflictingVariable { first: Var, second: Var },
}

/// Which reduction index a variable is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Indexed by the outer loop.
    I,
    /// Indexed by the inner loop.
    J,
    /// Not indexed; a parameter shared by every point.
    Param,
}

impl Category {
    pub fn code(self) -> u8 {
        match self {
            Category::I => 0,
            Category::J => 1,
            Category::Param => 2,
        }
    }
}

/// Leaf input of a formula: the `index`-th argument, a vector of length
/// `dim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var {
    pub index: usize,
    pub dim: usize,
    pub category: Category,
}

impl Var {
    pub fn new(index: usize, dim: usize, category: Category) -> Self {
        Self {
            index,
            dim,
            category,
        }
    }

    pub fn i(index: usize, dim: usize) -> Self {
        Self::new(index, dim, Category::I)
    }

    pub fn j(index: usize, dim: usize) -> Self {
        Self::new(index, dim, Category::J)
    }

    pub fn param(index: usize, dim: usize) -> Self {
        Self::new(index, dim, Category::Param)
    }
}

/// Elementwise operators with one child. Output length equals the child's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    Square,
    Exp,
    Log,
    Sin,
    Cos,
    /// Clamp into `[-1, 1]`.
    Clamp11,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Minus => "Minus",
            UnaryOp::Square => "Square",
            UnaryOp::Exp => "Exp",
            UnaryOp::Log => "Log",
            UnaryOp::Sin => "Sin",
            UnaryOp::Cos => "Cos",
            UnaryOp::Clamp11 => "Clamp11",
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Minus => -x,
            UnaryOp::Square => x * x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Clamp11 => x.clamp(-1.0, 1.0),
        }
    }
}

/// Elementwise operators with two children of equal length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Mult,
    Divide,
    /// `atan2(lhs, rhs)`, with `lhs` playing the role of `y`. Its partial in
    /// `rhs` is `-lhs / (lhs² + rhs²)`; the rule subtracts that branch rather
    /// than adding it.
    Atan2,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Subtract => "Subtract",
            BinaryOp::Mult => "Mult",
            BinaryOp::Divide => "Divide",
            BinaryOp::Atan2 => "Atan2",
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Subtract => lhs - rhs,
            BinaryOp::Mult => lhs * rhs,
            BinaryOp::Divide => lhs / rhs,
            BinaryOp::Atan2 => lhs.atan2(rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryNode {
    op: UnaryOp,
    arg: Box<Formula>,
}

impl UnaryNode {
    pub fn op(&self) -> UnaryOp {
        self.op
    }

    pub fn arg(&self) -> &Formula {
        &self.arg
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryNode {
    op: BinaryOp,
    lhs: Box<Formula>,
    rhs: Box<Formula>,
}

impl BinaryNode {
    pub fn op(&self) -> BinaryOp {
        self.op
    }

    pub fn lhs(&self) -> &Formula {
        &self.lhs
    }

    pub fn rhs(&self) -> &Formula {
        &self.rhs
    }
}

/// Repeats a length-1 child `dim` times.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastNode {
    arg: Box<Formula>,
    dim: usize,
}

impl BroadcastNode {
    pub fn arg(&self) -> &Formula {
        &self.arg
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

/// One slot of a contraction, computed from the other two slots through a
/// shared index table. `first` and `second` sit at `target.others()`.
#[derive(Debug, Clone)]
pub struct TensorDotNode {
    table: Arc<IndexTable>,
    target: Slot,
    first: Box<Formula>,
    second: Box<Formula>,
}

impl TensorDotNode {
    pub fn table(&self) -> &Arc<IndexTable> {
        &self.table
    }

    pub fn spec(&self) -> &ContractionSpec {
        self.table.spec()
    }

    pub fn target(&self) -> Slot {
        self.target
    }

    pub fn first(&self) -> &Formula {
        &self.first
    }

    pub fn second(&self) -> &Formula {
        &self.second
    }

    /// Children paired with the slot each one fills.
    pub fn inputs(&self) -> [(Slot, &Formula); 2] {
        let [s0, s1] = self.target.others();
        [(s0, &*self.first), (s1, &*self.second)]
    }
}

impl PartialEq for TensorDotNode {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.table.spec() == other.table.spec()
            && self.first == other.first
            && self.second == other.second
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Var(Var),
    /// Additive identity of the given length.
    Zero(usize),
    /// Every component equal to `value`.
    Const {
        value: f64,
        dim: usize,
    },
    Unary(UnaryNode),
    Binary(BinaryNode),
    /// Sum of all components, length 1.
    Sum(Box<Formula>),
    Broadcast(BroadcastNode),
    TensorDot(TensorDotNode),
}

impl Formula {
    pub fn var(var: Var) -> Self {
        Formula::Var(var)
    }

    pub fn zero(dim: usize) -> Self {
        Formula::Zero(dim)
    }

    pub fn constant(value: f64, dim: usize) -> Self {
        Formula::Const { value, dim }
    }

    pub fn unary(op: UnaryOp, arg: Formula) -> Self {
        Formula::Unary(UnaryNode {
            op,
            arg: Box::new(arg),
        })
    }

    pub fn binary(op: BinaryOp, lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        if lhs.dim() != rhs.dim() {
            return Err(FormulaError::LengthMismatch {
                op: op.name(),
                lhs: lhs.dim(),
                rhs: rhs.dim(),
            });
        }
        Ok(Formula::Binary(BinaryNode {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }))
    }

    pub fn minus(arg: Formula) -> Self {
        Self::unary(UnaryOp::Minus, arg)
    }

    pub fn square(arg: Formula) -> Self {
        Self::unary(UnaryOp::Square, arg)
    }

    pub fn exp(arg: Formula) -> Self {
        Self::unary(UnaryOp::Exp, arg)
    }

    pub fn log(arg: Formula) -> Self {
        Self::unary(UnaryOp::Log, arg)
    }

    pub fn sin(arg: Formula) -> Self {
        Self::unary(UnaryOp::Sin, arg)
    }

    pub fn cos(arg: Formula) -> Self {
        Self::unary(UnaryOp::Cos, arg)
    }

    pub fn clamp11(arg: Formula) -> Self {
        Self::unary(UnaryOp::Clamp11, arg)
    }

    pub fn add(lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        Self::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn subtract(lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        Self::binary(BinaryOp::Subtract, lhs, rhs)
    }

    pub fn mult(lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        Self::binary(BinaryOp::Mult, lhs, rhs)
    }

    pub fn divide(lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        Self::binary(BinaryOp::Divide, lhs, rhs)
    }

    pub fn atan2(lhs: Formula, rhs: Formula) -> Result<Self, FormulaError> {
        Self::binary(BinaryOp::Atan2, lhs, rhs)
    }

    pub fn sum(arg: Formula) -> Self {
        Formula::Sum(Box::new(arg))
    }

    pub fn broadcast(arg: Formula, dim: usize) -> Result<Self, FormulaError> {
        if arg.dim() != 1 {
            return Err(FormulaError::OperandLength {
                op: "Broadcast",
                expected: 1,
                found: arg.dim(),
            });
        }
        Ok(Formula::Broadcast(BroadcastNode {
            arg: Box::new(arg),
            dim,
        }))
    }

    /// Contract `a` (shape `dims_a`) with `b` (shape `dims_b`) over the
    /// paired axes `cont_a[i]` / `cont_b[i]`. The node's length is the
    /// contraction's `dimout`.
    pub fn tensor_dot(
        a: Formula,
        b: Formula,
        dims_a: &[usize],
        dims_b: &[usize],
        cont_a: &[usize],
        cont_b: &[usize],
    ) -> Result<Self, FormulaError> {
        let spec = ContractionSpec::new(dims_a, dims_b, cont_a, cont_b)?;
        Self::tensor_dot_with(a, b, spec, &TensorDotOptions::default())
    }

    pub fn tensor_dot_with(
        a: Formula,
        b: Formula,
        spec: ContractionSpec,
        opts: &TensorDotOptions,
    ) -> Result<Self, FormulaError> {
        let table = if opts.memoize {
            cached_index_table(&spec)?
        } else {
            Arc::new(IndexTable::build(&spec)?)
        };
        Self::contraction(table, Slot::Out, a, b)
    }

    /// Build the node computing slot `target` of `table`'s trilinear form.
    /// `first` and `second` fill `target.others()` in order.
    pub fn contraction(
        table: Arc<IndexTable>,
        target: Slot,
        first: Formula,
        second: Formula,
    ) -> Result<Self, FormulaError> {
        let [s0, s1] = target.others();
        for (slot, operand) in [(s0, &first), (s1, &second)] {
            let expected = table.slot_len(slot);
            if operand.dim() != expected {
                return Err(FormulaError::OperandLength {
                    op: "TensorDot",
                    expected,
                    found: operand.dim(),
                });
            }
        }
        Ok(Formula::TensorDot(TensorDotNode {
            table,
            target,
            first: Box::new(first),
            second: Box::new(second),
        }))
    }

    /// Output length.
    pub fn dim(&self) -> usize {
        match self {
            Formula::Var(var) => var.dim,
            Formula::Zero(dim) => *dim,
            Formula::Const { dim, .. } => *dim,
            Formula::Unary(node) => node.arg.dim(),
            Formula::Binary(node) => node.lhs.dim(),
            Formula::Sum(_) => 1,
            Formula::Broadcast(node) => node.dim,
            Formula::TensorDot(node) => node.table.slot_len(node.target),
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Formula::Zero(_))
    }

    pub fn children(&self) -> Vec<&Formula> {
        match self {
            Formula::Var(_) | Formula::Zero(_) | Formula::Const { .. } => Vec::new(),
            Formula::Unary(node) => vec![&*node.arg],
            Formula::Binary(node) => vec![&*node.lhs, &*node.rhs],
            Formula::Sum(arg) => vec![&**arg],
            Formula::Broadcast(node) => vec![&*node.arg],
            Formula::TensorDot(node) => vec![&*node.first, &*node.second],
        }
    }

    /// True if `var` occurs anywhere in the tree.
    pub fn depends_on(&self, var: &Var) -> bool {
        match self {
            Formula::Var(v) => v == var,
            _ => self.children().into_iter().any(|child| child.depends_on(var)),
        }
    }

    /// Record every leaf variable in `seen`, keyed by argument index.
    ///
    /// An index names one input buffer, so all leaves sharing it must be the
    /// same [`Var`]. Entries already in `seen` take part in the check.
    pub fn collect_variables(&self, seen: &mut BTreeMap<usize, Var>) -> Result<(), FormulaError> {
        match self {
            Formula::Var(var) => match seen.entry(var.index) {
                Entry::Vacant(slot) => {
                    slot.insert(*var);
                    Ok(())
                }
                Entry::Occupied(slot) if slot.get() == var => Ok(()),
                Entry::Occupied(slot) => Err(FormulaError::ConflictingVariable {
                    first: *slot.get(),
                    second: *var,
                }),
            },
            _ => self
                .children()
                .into_iter()
                .try_for_each(|child| child.collect_variables(seen)),
        }
    }

    /// Distinct leaf variables, ordered by argument index.
    pub fn variables(&self) -> Result<Vec<Var>, FormulaError> {
        let mut seen = BTreeMap::new();
        self.collect_variables(&mut seen)?;
        Ok(seen.into_values().collect())
    }

    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(Formula::node_count)
            .sum::<usize>()
    }
}

impl From<Var> for Formula {
    fn from(var: Var) -> Self {
        Formula::Var(var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unary_keeps_child_length() {
        let f = Formula::clamp11(Formula::var(Var::i(0, 4)));
        assert_eq!(f.dim(), 4);
    }

    #[test]
    fn sum_is_scalar_and_broadcast_requires_scalar() {
        let s = Formula::sum(Formula::var(Var::i(0, 5)));
        assert_eq!(s.dim(), 1);
        assert_eq!(Formula::broadcast(s, 7).unwrap().dim(), 7);
        let err = Formula::broadcast(Formula::var(Var::i(0, 2)), 7).unwrap_err();
        assert!(matches!(err, FormulaError::OperandLength { expected: 1, found: 2, .. }));
    }

    #[test]
    fn depends_on_distinguishes_category() {
        let f = Formula::square(Formula::var(Var::i(0, 2)));
        assert!(f.depends_on(&Var::i(0, 2)));
        assert!(!f.depends_on(&Var::j(0, 2)));
    }

    #[test]
    fn tensor_dot_checks_operand_lengths() {
        let a = Formula::var(Var::i(0, 8));
        let b = Formula::var(Var::j(1, 3));
        let err = Formula::tensor_dot(a, b, &[2, 2, 2], &[2, 2], &[2], &[0]).unwrap_err();
        assert_eq!(
            err,
            FormulaError::OperandLength {
                op: "TensorDot",
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn variables_are_listed_once_by_index() {
        let x = Formula::var(Var::i(2, 3));
        let y = Formula::var(Var::param(0, 3));
        let f = Formula::mult(Formula::add(x.clone(), y).unwrap(), x).unwrap();
        assert_eq!(f.variables().unwrap(), vec![Var::param(0, 3), Var::i(2, 3)]);
    }

    #[test]
    fn one_index_cannot_name_two_variables() {
        let f = Formula::add(Formula::var(Var::i(0, 1)), Formula::var(Var::j(0, 1))).unwrap();
        let err = f.variables().unwrap_err();
        assert_eq!(err.to_string(), "argument 0 is used both as Var(0,1,0) and as Var(0,1,1)");
    }

    #[test]
    fn node_count_counts_leaves() {
        let x = Formula::var(Var::i(0, 1));
        let f = Formula::add(x.clone(), Formula::square(x)).unwrap();
        assert_eq!(f.node_count(), 4);
    }
}
