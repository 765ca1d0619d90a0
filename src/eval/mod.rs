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

//! Reference evaluator for formula trees.
//!
//! Formulas are evaluated pointwise: every variable is bound to one concrete
//! vector and the tree is walked bottom-up. This is the oracle generated
//! kernels are checked against, not a fast path.

use std::collections::{BTreeMap, HashMap};

use crate::formula::{Formula, FormulaError, Var};
use crate::tensordot::OffsetOverrun;

pub mod finite_diff;

pub use finite_diff::{central_difference, max_abs_error, vjp_central_difference};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("variable {index} is not bound")]
    UnboundVariable { index: usize },
    #[error("variable {index} expects {expected} values, bound to {found}")]
    BindingLength {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("output buffer has length {found}, formula produces {expected}")]
    OutputLength { expected: usize, found: usize },
    /// A contraction node whose table addresses past a slot-sized buffer.
    #[error("contraction cannot be evaluated: {0}")]
    Unaddressable(OffsetOverrun),
    #[error(transparent)]
    Formula(#[from] FormulaError),
}

/// Variable bindings plus the tree walker.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    bindings: HashMap<usize, Vec<f64>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind argument `index` to `values`, replacing any previous binding.
    pub fn bind(&mut self, index: usize, values: impl Into<Vec<f64>>) -> &mut Self {
        self.bindings.insert(index, values.into());
        self
    }

    pub fn binding(&self, index: usize) -> Option<&[f64]> {
        self.bindings.get(&index).map(Vec::as_slice)
    }

    pub fn eval(&self, formula: &Formula) -> Result<Vec<f64>, EvalError> {
        let mut out = vec![0.0; formula.dim()];
        self.eval_into(formula, &mut out)?;
        Ok(out)
    }

    /// Evaluate into a caller-provided buffer of exactly `formula.dim()`
    /// values.
    ///
    /// Bindings are keyed by argument index, so every leaf sharing an index
    /// must be the same [`Var`]; otherwise this fails with
    /// [`FormulaError::ConflictingVariable`].
    pub fn eval_into(&self, formula: &Formula, out: &mut [f64]) -> Result<(), EvalError> {
        if out.len() != formula.dim() {
            return Err(EvalError::OutputLength {
                expected: formula.dim(),
                found: out.len(),
            });
        }
        formula.collect_variables(&mut BTreeMap::new())?;
        self.fill(formula, out)
    }

    fn eval_node(&self, formula: &Formula) -> Result<Vec<f64>, EvalError> {
        let mut out = vec![0.0; formula.dim()];
        self.fill(formula, &mut out)?;
        Ok(out)
    }

    fn lookup(&self, var: &Var) -> Result<&[f64], EvalError> {
        let values = self
            .bindings
            .get(&var.index)
            .ok_or(EvalError::UnboundVariable { index: var.index })?;
        if values.len() != var.dim {
            return Err(EvalError::BindingLength {
                index: var.index,
                expected: var.dim,
                found: values.len(),
            });
        }
        Ok(values)
    }

    fn fill(&self, formula: &Formula, out: &mut [f64]) -> Result<(), EvalError> {
        match formula {
            Formula::Var(var) => out.copy_from_slice(self.lookup(var)?),
            Formula::Zero(_) => out.fill(0.0),
            Formula::Const { value, .. } => out.fill(*value),
            Formula::Unary(node) => {
                self.fill(node.arg(), out)?;
                let op = node.op();
                for x in out.iter_mut() {
                    *x = op.apply(*x);
                }
            }
            Formula::Binary(node) => {
                self.fill(node.lhs(), out)?;
                let rhs = self.eval_node(node.rhs())?;
                let op = node.op();
                for (x, y) in out.iter_mut().zip(&rhs) {
                    *x = op.apply(*x, *y);
                }
            }
            Formula::Sum(arg) => {
                let values = self.eval_node(arg)?;
                out[0] = values.iter().sum();
            }
            Formula::Broadcast(node) => {
                let mut scalar = [0.0];
                self.fill(node.arg(), &mut scalar)?;
                out.fill(scalar[0]);
            }
            Formula::TensorDot(node) => {
                if let Some(overrun) = node.table().overrun() {
                    return Err(EvalError::Unaddressable(overrun));
                }
                let first = self.eval_node(node.first())?;
                let second = self.eval_node(node.second())?;
                out.fill(0.0);
                node.table()
                    .accumulate(node.target(), &first, &second, out);
            }
        }
        Ok(())
    }
}
