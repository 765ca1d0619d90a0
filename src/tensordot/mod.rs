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

//! Tensor-contraction index algebra.
//!
//! Given two operand shapes and a list of paired contracted axes, this module
//! validates the pairing, partitions the axes into kept and contracted sets,
//! and enumerates the full iteration space into a flat [`IndexTable`] of
//! `(I, kda, kdb)` triples. A kernel generator then only needs a single loop:
//! `out[I] += A[kda] * B[kdb]` over every entry.
//!
//! Everything is pure and depends only on the [`ContractionSpec`], so tables
//! are memoized process-wide through [`cached_index_table`].

mod cache;
mod spec;
mod table;

pub use cache::{cache_stats, cached_index_table, TableCacheStats};
pub use spec::{AxisPartition, ContractionError, ContractionSpec, Operand};
pub use table::{IndexTable, KdEntry, OffsetOverrun, Slot};

use crate::shapes::Shape;

/// Validate the contraction and build its output shape and index table.
pub fn build_index_table(
    dims_a: &[usize],
    dims_b: &[usize],
    cont_a: &[usize],
    cont_b: &[usize],
) -> Result<(Shape, IndexTable), ContractionError> {
    let spec = ContractionSpec::new(dims_a, dims_b, cont_a, cont_b)?;
    let table = IndexTable::build(&spec)?;
    Ok((table.output_shape().to_vec(), table))
}
