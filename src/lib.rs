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

//! symkern: symbolic formula front end for generated reduction kernels.
//!
//! Formulas are small immutable trees over vector-valued variables. They can
//! be evaluated pointwise, rendered to a stable identifier, and (with the
//! `autodiff` feature) differentiated symbolically into new formulas.
//! Tensor contractions are lowered to flat index tables that a kernel
//! generator turns into a single multiply-accumulate loop.
pub mod config;
pub mod eval;
pub mod formula;
pub mod ops;
pub mod shapes;
pub mod tensordot;

#[cfg(feature = "autodiff")]
pub mod autodiff;

pub mod conformance;

pub use config::{load_options, ClampGradient, GradientOptions, Options, TensorDotOptions};
pub use conformance::{ConformanceOptions, ConformanceProfile};
pub use eval::{EvalError, Evaluator};
pub use formula::{Category, Formula, FormulaError, Var};
pub use tensordot::{ContractionError, ContractionSpec, IndexTable, KdEntry, OffsetOverrun};

#[cfg(feature = "autodiff")]
pub use autodiff::{differentiate, differentiate_with_options, AutodiffError};
