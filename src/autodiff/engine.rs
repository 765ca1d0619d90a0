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

use std::collections::BTreeMap;

use log::trace;

use crate::config::GradientOptions;
use crate::formula::{Formula, FormulaError, Var};

use super::rules;

/// Errors returned by the autodiff engine.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AutodiffError {
    /// The upstream gradient must have the formula's output length.
    #[error("upstream gradient has length {found}, formula produces {expected}")]
    GradientLength { expected: usize, found: usize },
    /// The inputs name one argument index with two different variables, or
    /// a derivative rule produced an ill-formed node.
    #[error("invalid formula: {0}")]
    Formula(#[from] FormulaError),
}

/// Gradient of `formula` with respect to `var`, contracted with `upstream`,
/// using default options.
pub fn differentiate(
    formula: &Formula,
    var: &Var,
    upstream: Formula,
) -> Result<Formula, AutodiffError> {
    differentiate_with_options(formula, var, upstream, &GradientOptions::default())
}

/// Like [`differentiate`], with explicit options.
///
/// The result always has length `var.dim`. A formula that does not mention
/// `var` differentiates to `Zero(var.dim)`. The target, the formula and the
/// upstream gradient must agree on every argument index they share, as the
/// evaluator binds buffers by index.
pub fn differentiate_with_options(
    formula: &Formula,
    var: &Var,
    upstream: Formula,
    options: &GradientOptions,
) -> Result<Formula, AutodiffError> {
    if upstream.dim() != formula.dim() {
        return Err(AutodiffError::GradientLength {
            expected: formula.dim(),
            found: upstream.dim(),
        });
    }
    let mut seen = BTreeMap::from([(var.index, *var)]);
    formula.collect_variables(&mut seen)?;
    upstream.collect_variables(&mut seen)?;

    let mut builder = GradientBuilder::new(*var, options);
    builder.backprop(formula, upstream)
}

struct GradientBuilder<'a> {
    target: Var,
    options: &'a GradientOptions,
    depth: usize,
}

impl<'a> GradientBuilder<'a> {
    fn new(target: Var, options: &'a GradientOptions) -> Self {
        Self {
            target,
            options,
            depth: 0,
        }
    }

    fn backprop(&mut self, node: &Formula, upstream: Formula) -> Result<Formula, AutodiffError> {
        if self.options.simplify && (upstream.is_zero() || !node.depends_on(&self.target)) {
            return Ok(Formula::zero(self.target.dim));
        }
        trace!(
            "{:indent$}d/d{} through {}",
            "",
            self.target,
            node,
            indent = self.depth * 2
        );
        self.depth += 1;
        let grad = rules::apply_rule(self, node, upstream);
        self.depth -= 1;
        grad
    }

    fn simplify(&self) -> bool {
        self.options.simplify
    }
}

// Helper API used by derivative rules. Arithmetic helpers fold zeros when
// simplification is on.
pub(super) trait GradientOps {
    fn options(&self) -> &GradientOptions;
    fn target(&self) -> Var;
    fn backprop(&mut self, node: &Formula, upstream: Formula) -> Result<Formula, AutodiffError>;
    fn add(&mut self, lhs: Formula, rhs: Formula) -> Result<Formula, AutodiffError>;
    fn sub(&mut self, lhs: Formula, rhs: Formula) -> Result<Formula, AutodiffError>;
    fn mul(&mut self, lhs: Formula, rhs: Formula) -> Result<Formula, AutodiffError>;
    fn div(&mut self, lhs: Formula, rhs: Formula) -> Result<Formula, AutodiffError>;
    fn neg(&mut self, arg: Formula) -> Formula;

    fn zero(&self) -> Formula {
        Formula::zero(self.target().dim)
    }
}

impl<'a> GradientOps for GradientBuilder<'a> {
    fn options(&self) -> &GradientOptions {
        self.options
    }

    fn target(&self) -> Var {
        self.target
    }

    fn backprop(&mut self, node: &Formula, upstream: Formula) -> Result<Formula, AutodiffError> {
        GradientBuilder::backprop(self, node, upstream)
    }

    fn add(&mut self, lhs: Formula, rhs: Formula) -> Result<Formula, AutodiffError> {
        if self.simplify() {
            if lhs.is_zero() && lhs.dim() == rhs.dim() {
                return Ok(rhs);
            }
            if rhs.is_zero() && lhs.dim() == rhs.dim() {
                return Ok(lhs);
            }
        }
        Ok(Formula::add(lhs, rhs)?)
    }

    fn sub(&mut self, lhs: Formula, rhs: Formula) -> Result<Formula, AutodiffError> {
        if self.simplify() && lhs.dim() == rhs.dim() {
            if rhs.is_zero() {
                return Ok(lhs);
            }
            if lhs.is_zero() {
                return Ok(self.neg(rhs));
            }
        }
        Ok(Formula::subtract(lhs, rhs)?)
    }

    fn mul(&mut self, lhs: Formula, rhs: Formula) -> Result<Formula, AutodiffError> {
        if self.simplify() && (lhs.is_zero() || rhs.is_zero()) && lhs.dim() == rhs.dim() {
            return Ok(Formula::zero(lhs.dim()));
        }
        Ok(Formula::mult(lhs, rhs)?)
    }

    fn div(&mut self, lhs: Formula, rhs: Formula) -> Result<Formula, AutodiffError> {
        if self.simplify() && lhs.is_zero() && lhs.dim() == rhs.dim() {
            return Ok(lhs);
        }
        Ok(Formula::divide(lhs, rhs)?)
    }

    fn neg(&mut self, arg: Formula) -> Formula {
        if self.simplify() && arg.is_zero() {
            return arg;
        }
        Formula::minus(arg)
    }
}
