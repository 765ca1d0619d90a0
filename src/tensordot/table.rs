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

use log::{debug, warn};

use crate::shapes::{self, Shape};

use super::spec::{AxisPartition, ContractionError, ContractionSpec};

/// One point of the full iteration space: output cell `i` accumulates
/// `A[kda] * B[kdb]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KdEntry {
    pub i: usize,
    pub kda: usize,
    pub kdb: usize,
}

/// The three buffers tied together by an index table.
///
/// A contraction is the trilinear form `T(o, a, b) = Σ o[I]·a[kda]·b[kdb]`
/// over every entry. Computing one slot from the other two always walks the
/// same table; the forward product computes [`Slot::Out`], gradients compute
/// [`Slot::A`] or [`Slot::B`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Out,
    A,
    B,
}

impl Slot {
    /// The two other slots, in canonical order.
    pub fn others(self) -> [Slot; 2] {
        match self {
            Slot::Out => [Slot::A, Slot::B],
            Slot::A => [Slot::Out, Slot::B],
            Slot::B => [Slot::Out, Slot::A],
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Out => f.write_str("out"),
            Slot::A => f.write_str("a"),
            Slot::B => f.write_str("b"),
        }
    }
}

/// An offset of the table that lands at or past the end of the buffer it
/// addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetOverrun {
    pub slot: Slot,
    pub max_offset: usize,
    pub len: usize,
}

impl fmt::Display for OffsetOverrun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot {} is addressed at offset {}, past its {} elements",
            self.slot, self.max_offset, self.len
        )
    }
}

/// Complete, immutable enumeration of a contraction.
///
/// Holds exactly `dimtot` entries. Several entries share an output index,
/// one per value of the contracted axes, so consumers must accumulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTable {
    spec: ContractionSpec,
    output_shape: Shape,
    dimout: usize,
    entries: Vec<KdEntry>,
    overrun: Option<OffsetOverrun>,
}

impl IndexTable {
    /// Enumerate every point of the full iteration space of `spec`.
    ///
    /// The output stride list is built from `keepA` extents followed by the
    /// *reversed* `keepB` extents, and B's kept indices are applied against
    /// B's strides in reverse. Downstream addressing of operand B depends on
    /// this convention, so it is reproduced exactly, even for layouts where
    /// it steps past the end of a buffer. Those tables are still built and
    /// report the first offending slot through [`IndexTable::overrun`].
    pub fn build(spec: &ContractionSpec) -> Result<Self, ContractionError> {
        let part = spec.partition();
        let output_shape = part.output_shape();
        let full = part.full_iteration_shape();
        let dimout =
            shapes::checked_num_elements(&output_shape).ok_or(ContractionError::SizeOverflow)?;
        let dimtot = shapes::checked_num_elements(&full).ok_or(ContractionError::SizeOverflow)?;

        let strides = OffsetStrides::new(spec, &part);
        let overrun = if dimtot == 0 {
            None
        } else {
            [
                (Slot::Out, &strides.out, dimout),
                (Slot::A, &strides.a, spec.len_a()),
                (Slot::B, &strides.b, spec.len_b()),
            ]
            .into_iter()
            .find_map(|(slot, strides, len)| overrun_of(slot, &full, strides, len))
        };

        let mut point = vec![0usize; full.len()];
        let mut entries = Vec::with_capacity(dimtot);
        for linear in 0..dimtot {
            shapes::unravel_index(linear, &full, &mut point);
            entries.push(KdEntry {
                i: shapes::ravel_index(&point, &strides.out),
                kda: shapes::ravel_index(&point, &strides.a),
                kdb: shapes::ravel_index(&point, &strides.b),
            });
        }

        debug!(
            "built index table for {spec}: output {:?}, dimout {dimout}, dimtot {dimtot}",
            output_shape
        );
        if let Some(overrun) = &overrun {
            warn!("contraction {spec} is not addressable: {overrun}");
        } else if !spec.is_canonical_layout() {
            warn!(
                "contraction {spec} is not in canonical layout; offsets follow the positional \
                 stride convention, not plain row-major einsum"
            );
        }

        Ok(Self {
            spec: spec.clone(),
            output_shape,
            dimout,
            entries,
            overrun,
        })
    }

    /// First slot, in `Out`, `A`, `B` order, whose offsets exceed its
    /// buffer length.
    pub fn overrun(&self) -> Option<OffsetOverrun> {
        self.overrun
    }

    /// True when every `I`, `kda` and `kdb` fits in its slot's buffer.
    pub fn is_addressable(&self) -> bool {
        self.overrun.is_none()
    }

    pub fn spec(&self) -> &ContractionSpec {
        &self.spec
    }

    pub fn entries(&self) -> &[KdEntry] {
        &self.entries
    }

    /// Number of entries; always equals [`IndexTable::dimtot`].
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    pub fn dimout(&self) -> usize {
        self.dimout
    }

    pub fn dimtot(&self) -> usize {
        self.entries.len()
    }

    /// Flat buffer length of the given slot.
    pub fn slot_len(&self, slot: Slot) -> usize {
        match slot {
            Slot::Out => self.dimout,
            Slot::A => self.spec.len_a(),
            Slot::B => self.spec.len_b(),
        }
    }

    /// `out[I] += a[kda] * b[kdb]` for every entry.
    ///
    /// # Panics
    ///
    /// Panics if a buffer is shorter than the offsets it is addressed by.
    /// Sizing buffers is the caller's job; [`IndexTable::is_addressable`]
    /// tells whether slot-sized buffers suffice.
    pub fn contract(&self, a: &[f64], b: &[f64], out: &mut [f64]) {
        self.accumulate(Slot::Out, a, b, out);
    }

    /// Accumulate slot `target` of the trilinear form into `out`, reading the
    /// other two slots from `first` and `second` (in [`Slot::others`] order).
    ///
    /// # Panics
    ///
    /// Same as [`IndexTable::contract`].
    pub fn accumulate(&self, target: Slot, first: &[f64], second: &[f64], out: &mut [f64]) {
        match target {
            Slot::Out => {
                for e in &self.entries {
                    out[e.i] += first[e.kda] * second[e.kdb];
                }
            }
            Slot::A => {
                for e in &self.entries {
                    out[e.kda] += first[e.i] * second[e.kdb];
                }
            }
            Slot::B => {
                for e in &self.entries {
                    out[e.kdb] += first[e.i] * second[e.kda];
                }
            }
        }
    }
}

/// Per-axis multipliers turning a point of the full iteration space
/// (`keepA`, `keepB`, contracted) into `I`, `kda` and `kdb`. Axes that do
/// not reach a buffer get stride 0.
struct OffsetStrides {
    out: Vec<usize>,
    a: Vec<usize>,
    b: Vec<usize>,
}

impl OffsetStrides {
    fn new(spec: &ContractionSpec, part: &AxisPartition) -> Self {
        let n_keep_a = part.keep_a.len();
        let n_keep_b = part.keep_b.len();
        let n_cont = part.contracted_dims.len();
        let rank_b = spec.dims_b().len();
        let strides_a = shapes::row_major_strides(spec.dims_a());
        let strides_b = shapes::row_major_strides(spec.dims_b());

        let mut out_layout = part.keep_a_dims.clone();
        out_layout.extend(part.keep_b_dims.iter().rev());
        let mut out = shapes::row_major_strides(&out_layout);
        out.resize(n_keep_a + n_keep_b + n_cont, 0);

        // A is read positionally: its first strides go to the kept axes and
        // the next ones to the contracted axes.
        let mut a = strides_a[..n_keep_a].to_vec();
        a.resize(n_keep_a + n_keep_b, 0);
        a.extend_from_slice(&strides_a[n_keep_a..n_keep_a + n_cont]);

        let mut b = vec![0; n_keep_a];
        b.extend((0..n_keep_b).map(|j| strides_b[rank_b - 1 - j]));
        b.extend_from_slice(&strides_b[..n_cont]);

        Self { out, a, b }
    }
}

/// Strides are non-negative, so the largest offset is reached at the last
/// index of every axis.
fn overrun_of(slot: Slot, full: &[usize], strides: &[usize], len: usize) -> Option<OffsetOverrun> {
    let max_offset = full
        .iter()
        .zip(strides)
        .map(|(extent, stride)| extent.saturating_sub(1).saturating_mul(*stride))
        .fold(0usize, usize::saturating_add);
    (max_offset >= len).then_some(OffsetOverrun {
        slot,
        max_offset,
        len,
    })
}

impl fmt::Display for IndexTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "output shape: {:?}", self.output_shape)?;
        writeln!(f, "dimout: {}", self.dimout)?;
        writeln!(f, "dimtot: {}", self.dimtot())?;
        for (n, e) in self.entries.iter().enumerate() {
            writeln!(f, "  {n:>4}: I={} kda={} kdb={}", e.i, e.kda, e.kdb)?;
        }
        Ok(())
    }
}
