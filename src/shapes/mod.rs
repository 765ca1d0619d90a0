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

//! Shared extent and stride helpers for the contraction algebra.
//!
//! Shapes are ordered lists of non-negative extents laid out row-major: the
//! last axis varies fastest. Nothing here is symbolic; every helper works on
//! concrete `usize` extents.

/// A rank-N tensor shape represented as a list of extents.
pub type Shape = Vec<usize>;

/// Number of elements described by `dims`. The empty shape has one element.
pub fn num_elements(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Like [`num_elements`] but returns `None` on overflow.
pub fn checked_num_elements(dims: &[usize]) -> Option<usize> {
    let mut total = 1usize;
    for &dim in dims {
        total = total.checked_mul(dim)?;
    }
    Some(total)
}

/// Cumulative-product strides for a row-major buffer: `strides[i]` is the
/// product of every extent after axis `i`, so the last stride is always 1.
pub fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

/// Mixed-radix decomposition of `linear` over `dims`, least-significant axis
/// last. `out` must have the same length as `dims`.
pub fn unravel_index(mut linear: usize, dims: &[usize], out: &mut [usize]) {
    debug_assert_eq!(dims.len(), out.len());
    for (slot, &extent) in out.iter_mut().zip(dims).rev() {
        if extent == 0 {
            *slot = 0;
            continue;
        }
        *slot = linear % extent;
        linear /= extent;
    }
}

/// Dot product of per-axis indices with strides.
pub fn ravel_index(indices: &[usize], strides: &[usize]) -> usize {
    indices
        .iter()
        .zip(strides)
        .map(|(index, stride)| index * stride)
        .sum()
}

/// Extents of `dims` at the given axes, in the order the axes are listed.
pub fn select_dims(dims: &[usize], axes: &[usize]) -> Shape {
    axes.iter().map(|&axis| dims[axis]).collect()
}

/// Axes of a rank-`rank` operand that do not appear in `excluded`, in
/// ascending order.
pub fn complement_axes(rank: usize, excluded: &[usize]) -> Vec<usize> {
    (0..rank).filter(|axis| !excluded.contains(axis)).collect()
}
