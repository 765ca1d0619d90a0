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

//! Symbolic reverse-mode differentiation of formula trees.
//!
//! [`differentiate`] takes a formula `F`, a variable `V` and an upstream
//! gradient `G` of the same length as `F`, and returns a new formula of
//! length `V.dim` computing `(∂F/∂V)ᵀ · G`. Every operator contributes one
//! rule that rewrites the upstream gradient and hands it to its children, so
//! the result is an ordinary formula that can be evaluated, printed, or
//! differentiated again.
//!
//! ```
//! use symkern::autodiff::differentiate;
//! use symkern::formula::{Formula, Var};
//!
//! let x = Var::i(0, 1);
//! let f = Formula::exp(Formula::var(x));
//! let grad = differentiate(&f, &x, Formula::constant(1.0, 1)).unwrap();
//! assert_eq!(grad.to_string(), "Mult(Exp(Var(0,1,0)),Const(1.0,1))");
//! ```

mod engine;
mod rules;

pub use crate::config::{ClampGradient, GradientOptions};
pub use engine::{differentiate, differentiate_with_options, AutodiffError};
