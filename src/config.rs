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

//! Options for the formula compiler, loadable from a `Symkern.toml` file.
//!
//! ```toml
//! [autodiff]
//! clamp_gradient = "pass-through"
//! simplify = true
//!
//! [tensordot]
//! memoize = false
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Convention used for the derivative of `Clamp11`, which is not
/// differentiable at ±1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClampGradient {
    /// `∂F/∂A · g = A · g`. This is the shipped rule and the default.
    #[default]
    Scaled,
    /// `∂F/∂A · g = g`, the straight-through estimator.
    PassThrough,
}

/// Options steering symbolic differentiation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GradientOptions {
    pub clamp_gradient: ClampGradient,
    /// Drop additive and multiplicative zeros while building gradient trees.
    pub simplify: bool,
}

impl Default for GradientOptions {
    fn default() -> Self {
        Self {
            clamp_gradient: ClampGradient::default(),
            simplify: true,
        }
    }
}

/// Options steering contraction nodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TensorDotOptions {
    /// Share index tables through the process-wide cache.
    pub memoize: bool,
}

impl Default for TensorDotOptions {
    fn default() -> Self {
        Self { memoize: true }
    }
}

/// Top-level options file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub autodiff: GradientOptions,
    pub tensordot: TensorDotOptions,
}

impl Options {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Load options from a TOML file.
pub fn load_options(path: &Path) -> Result<Options> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let options = Options::from_toml_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(options)
}
