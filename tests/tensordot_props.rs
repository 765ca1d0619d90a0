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

use proptest::prelude::*;

use symkern::conformance::naive_tensordot;
use symkern::tensordot::{ContractionSpec, IndexTable, Slot};

/// Canonical contractions: A = keepA ++ cont, B = cont ++ (at most one kept
/// axis).
fn canonical_spec() -> impl Strategy<Value = ContractionSpec> {
    (
        prop::collection::vec(1usize..4, 0..3),
        prop::collection::vec(1usize..4, 0..3),
        prop::option::of(1usize..4),
    )
        .prop_map(|(keep_a, cont, keep_b)| {
            let n = cont.len();
            let rank_a = keep_a.len() + n;
            let mut dims_a = keep_a;
            dims_a.extend_from_slice(&cont);
            let mut dims_b = cont;
            dims_b.extend(keep_b);
            let cont_a: Vec<usize> = (rank_a - n..rank_a).collect();
            let cont_b: Vec<usize> = (0..n).collect();
            ContractionSpec::new(dims_a, dims_b, cont_a, cont_b).expect("canonical spec is valid")
        })
}

/// Any valid pairing of axes, canonical or not.
fn any_spec() -> impl Strategy<Value = ContractionSpec> {
    (
        prop::collection::vec(1usize..4, 1..4),
        prop::collection::vec(1usize..4, 1..4),
        any::<prop::sample::Index>(),
        any::<prop::sample::Index>(),
        any::<bool>(),
    )
        .prop_map(|(dims_a, mut dims_b, ia, ib, contract)| {
            let axis_a = ia.index(dims_a.len());
            let axis_b = ib.index(dims_b.len());
            let spec = if contract {
                dims_b[axis_b] = dims_a[axis_a];
                ContractionSpec::new(dims_a, dims_b, vec![axis_a], vec![axis_b])
            } else {
                ContractionSpec::new(dims_a, dims_b, vec![], vec![])
            };
            spec.expect("paired extents match")
        })
}

fn operand(len: usize, seed: u32) -> Vec<f64> {
    (0..len)
        .map(|n| f64::from((n as u32).wrapping_mul(2_654_435_761).wrapping_add(seed) % 17) - 8.0)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn table_len_is_dimtot(spec in any_spec()) {
        let table = IndexTable::build(&spec).expect("validated specs always build");
        prop_assert_eq!(table.len(), spec.dimtot());
        let contracted: usize = spec.partition().contracted_dims.iter().product();
        prop_assert_eq!(table.dimtot(), table.dimout() * contracted);
    }

    #[test]
    fn dimout_is_product_of_kept_extents(spec in any_spec()) {
        let part = spec.partition();
        let kept: usize = part.keep_a_dims.iter().chain(&part.keep_b_dims).product();
        prop_assert_eq!(spec.dimout(), kept);
    }

    #[test]
    fn overrun_agrees_with_entries(spec in any_spec()) {
        let table = IndexTable::build(&spec).expect("validated specs always build");
        let max_of = |slot: Slot| {
            table
                .entries()
                .iter()
                .map(|e| match slot {
                    Slot::Out => e.i,
                    Slot::A => e.kda,
                    Slot::B => e.kdb,
                })
                .max()
                .unwrap_or(0)
        };
        let in_bounds = [Slot::Out, Slot::A, Slot::B]
            .into_iter()
            .all(|slot| table.is_empty() || max_of(slot) < table.slot_len(slot));
        prop_assert_eq!(table.is_addressable(), in_bounds);
        if let Some(overrun) = table.overrun() {
            prop_assert_eq!(overrun.max_offset, max_of(overrun.slot));
            prop_assert_eq!(overrun.len, table.slot_len(overrun.slot));
        }
    }

    #[test]
    fn canonical_tables_match_naive_einsum(spec in canonical_spec(), seed in 0u32..1000) {
        prop_assert!(spec.is_canonical_layout());
        let table = IndexTable::build(&spec).expect("validated specs always build");
        prop_assert!(table.is_addressable());
        let a = operand(spec.len_a(), seed);
        let b = operand(spec.len_b(), seed.wrapping_add(7));
        let mut out = vec![0.0; table.dimout()];
        table.contract(&a, &b, &mut out);
        // Small integers: exact in f64.
        prop_assert_eq!(out, naive_tensordot(&spec, &a, &b));
    }
}
