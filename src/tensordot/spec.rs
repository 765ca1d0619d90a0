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

use crate::shapes::{self, Shape};

/// Which operand of a contraction an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    A,
    B,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::A => f.write_str("A"),
            Operand::B => f.write_str("B"),
        }
    }
}

/// Construction-time failures of a contraction spec.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ContractionError {
    /// `contA` and `contB` must pair up one to one.
    #[error("contracted axis lists differ in length: {a} for A, {b} for B")]
    ArityMismatch { a: usize, b: usize },
    /// A contracted axis index is not smaller than the operand rank.
    #[error("axis {axis} out of range for operand {operand} of rank {rank}")]
    AxisOutOfRange {
        operand: Operand,
        axis: usize,
        rank: usize,
    },
    /// The same axis was contracted twice on one operand.
    #[error("axis {axis} of operand {operand} is contracted more than once")]
    DuplicateAxis { operand: Operand, axis: usize },
    /// A paired axis has different extents on the two operands.
    #[error(
        "contracted extents differ at pair {pair}: A axis {axis_a} has {extent_a}, B axis {axis_b} has {extent_b}"
    )]
    ExtentMismatch {
        pair: usize,
        axis_a: usize,
        axis_b: usize,
        extent_a: usize,
        extent_b: usize,
    },
    /// The full iteration space does not fit in `usize`.
    #[error("iteration space of the contraction overflows usize")]
    SizeOverflow,
}

/// Shapes of both operands plus the list of paired contracted axes.
///
/// A value of this type is always valid: [`ContractionSpec::new`] checks
/// every invariant, so downstream table construction cannot observe a
/// malformed contraction. Specs are hashable and serve as the memo key for
/// index tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractionSpec {
    dims_a: Shape,
    dims_b: Shape,
    cont_a: Vec<usize>,
    cont_b: Vec<usize>,
}

/// Kept and contracted axes derived from a [`ContractionSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisPartition {
    /// Axes of A not in `contA`, ascending.
    pub keep_a: Vec<usize>,
    /// Axes of B not in `contB`, ascending.
    pub keep_b: Vec<usize>,
    /// Extents of `keep_a`.
    pub keep_a_dims: Shape,
    /// Extents of `keep_b`.
    pub keep_b_dims: Shape,
    /// Extents of the paired axes, in `contA` order.
    pub contracted_dims: Shape,
}

impl ContractionSpec {
    pub fn new(
        dims_a: impl Into<Shape>,
        dims_b: impl Into<Shape>,
        cont_a: impl Into<Vec<usize>>,
        cont_b: impl Into<Vec<usize>>,
    ) -> Result<Self, ContractionError> {
        let spec = Self {
            dims_a: dims_a.into(),
            dims_b: dims_b.into(),
            cont_a: cont_a.into(),
            cont_b: cont_b.into(),
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<(), ContractionError> {
        if self.cont_a.len() != self.cont_b.len() {
            return Err(ContractionError::ArityMismatch {
                a: self.cont_a.len(),
                b: self.cont_b.len(),
            });
        }
        check_axes(Operand::A, &self.cont_a, self.dims_a.len())?;
        check_axes(Operand::B, &self.cont_b, self.dims_b.len())?;

        for (pair, (&axis_a, &axis_b)) in self.cont_a.iter().zip(&self.cont_b).enumerate() {
            let extent_a = self.dims_a[axis_a];
            let extent_b = self.dims_b[axis_b];
            if extent_a != extent_b {
                return Err(ContractionError::ExtentMismatch {
                    pair,
                    axis_a,
                    axis_b,
                    extent_a,
                    extent_b,
                });
            }
        }

        let total_rank = self.dims_a.len() + self.dims_b.len() - self.cont_a.len();
        let mut full = Vec::with_capacity(total_rank);
        full.extend_from_slice(&self.dims_a);
        full.extend(
            shapes::complement_axes(self.dims_b.len(), &self.cont_b)
                .into_iter()
                .map(|axis| self.dims_b[axis]),
        );
        shapes::checked_num_elements(&full).ok_or(ContractionError::SizeOverflow)?;
        Ok(())
    }

    pub fn dims_a(&self) -> &[usize] {
        &self.dims_a
    }

    pub fn dims_b(&self) -> &[usize] {
        &self.dims_b
    }

    pub fn cont_a(&self) -> &[usize] {
        &self.cont_a
    }

    pub fn cont_b(&self) -> &[usize] {
        &self.cont_b
    }

    /// Flat length of operand A.
    pub fn len_a(&self) -> usize {
        shapes::num_elements(&self.dims_a)
    }

    /// Flat length of operand B.
    pub fn len_b(&self) -> usize {
        shapes::num_elements(&self.dims_b)
    }

    pub fn partition(&self) -> AxisPartition {
        let keep_a = shapes::complement_axes(self.dims_a.len(), &self.cont_a);
        let keep_b = shapes::complement_axes(self.dims_b.len(), &self.cont_b);
        AxisPartition {
            keep_a_dims: shapes::select_dims(&self.dims_a, &keep_a),
            keep_b_dims: shapes::select_dims(&self.dims_b, &keep_b),
            contracted_dims: shapes::select_dims(&self.dims_a, &self.cont_a),
            keep_a,
            keep_b,
        }
    }

    /// `keepA` extents followed by `keepB` extents.
    pub fn output_shape(&self) -> Shape {
        self.partition().output_shape()
    }

    /// Number of output cells.
    pub fn dimout(&self) -> usize {
        shapes::num_elements(&self.output_shape())
    }

    /// Number of points in the full iteration space.
    pub fn dimtot(&self) -> usize {
        shapes::num_elements(&self.partition().full_iteration_shape())
    }

    /// True when the index table agrees with plain row-major einsum
    /// semantics: A contracts its trailing axes in order, B contracts its
    /// leading axes in order, and B keeps at most one axis. Outside this
    /// layout the preserved stride convention reads A positionally and B's
    /// kept axes in reverse.
    pub fn is_canonical_layout(&self) -> bool {
        let n = self.cont_a.len();
        let rank_a = self.dims_a.len();
        let trailing_a = self
            .cont_a
            .iter()
            .enumerate()
            .all(|(k, &axis)| axis == rank_a - n + k);
        let leading_b = self.cont_b.iter().enumerate().all(|(k, &axis)| axis == k);
        let kept_b = self.dims_b.len() - n;
        trailing_a && leading_b && kept_b <= 1
    }
}

impl fmt::Display for ContractionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?},{:?},{:?},{:?}",
            self.dims_a, self.dims_b, self.cont_a, self.cont_b
        )
    }
}

impl AxisPartition {
    pub fn output_shape(&self) -> Shape {
        let mut out = self.keep_a_dims.clone();
        out.extend_from_slice(&self.keep_b_dims);
        out
    }

    /// Output shape followed by the contracted extents.
    pub fn full_iteration_shape(&self) -> Shape {
        let mut full = self.output_shape();
        full.extend_from_slice(&self.contracted_dims);
        full
    }
}

fn check_axes(operand: Operand, axes: &[usize], rank: usize) -> Result<(), ContractionError> {
    for (pos, &axis) in axes.iter().enumerate() {
        if axis >= rank {
            return Err(ContractionError::AxisOutOfRange {
                operand,
                axis,
                rank,
            });
        }
        if axes[..pos].contains(&axis) {
            return Err(ContractionError::DuplicateAxis { operand, axis });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_preserves_axis_order() {
        let spec = ContractionSpec::new(vec![2, 3, 4, 5], vec![5, 6, 3], vec![3, 1], vec![0, 2])
            .expect("valid spec");
        let part = spec.partition();
        assert_eq!(part.keep_a, vec![0, 2]);
        assert_eq!(part.keep_b, vec![1]);
        assert_eq!(part.keep_a_dims, vec![2, 4]);
        assert_eq!(part.keep_b_dims, vec![6]);
        assert_eq!(part.contracted_dims, vec![5, 3]);
        assert_eq!(part.full_iteration_shape(), vec![2, 4, 6, 5, 3]);
    }

    #[test]
    fn canonical_layout_detection() {
        let matmul = ContractionSpec::new(vec![3, 4], vec![4, 2], vec![1], vec![0]).unwrap();
        assert!(matmul.is_canonical_layout());

        let leading_a = ContractionSpec::new(vec![4, 3], vec![4, 2], vec![0], vec![0]).unwrap();
        assert!(!leading_a.is_canonical_layout());

        let two_kept_b = ContractionSpec::new(vec![3, 4], vec![4, 2, 2], vec![1], vec![0]).unwrap();
        assert!(!two_kept_b.is_canonical_layout());
    }

    #[test]
    fn duplicate_axes_rejected() {
        let err = ContractionSpec::new(vec![2, 2], vec![2, 2], vec![1, 1], vec![0, 1]).unwrap_err();
        assert_eq!(
            err,
            ContractionError::DuplicateAxis {
                operand: Operand::A,
                axis: 1
            }
        );
    }
}
