// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use serde::{Deserialize, Serialize};

use super::ExprRef;
use crate::{rewrite::EquivalenceContext, types::TypeRef};

/// Declarative description of an unnest (flat-map) over a collection-valued
/// column, kept high-level so optimization passes can merge or reorder
/// unnests without touching row-level code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatMapSpec {
	/// Tuple type of the input rows.
	pub input_row_type: TypeRef,
	/// Closure extracting the collection from an input row; its result
	/// may be nullable, in which case null unnests to zero rows.
	pub collection: ExprRef,
	/// Input column indexes copied through unchanged into every output row.
	pub pass_through: Vec<usize>,
	/// Optional per-element projections applied instead of emitting the
	/// element itself.
	pub projections: Option<Vec<ExprRef>>,
	/// Whether the iterated element appears in the output row.
	pub emit_element: bool,
	/// Type of one collection element.
	pub element_type: TypeRef,
	/// Requested type of the 1-based position column, when the query asked
	/// for WITH ORDINALITY.
	pub ordinality_type: Option<TypeRef>,
	/// Reordering of the assembled output columns.
	pub shuffle: Shuffle,
}

impl FlatMapSpec {
	/// Structural equivalence, independent of node identity.
	pub fn equivalent(&self, other: &FlatMapSpec) -> bool {
		self.input_row_type.same_type(&other.input_row_type)
			&& EquivalenceContext::equivalent(&self.collection, &other.collection)
			&& self.pass_through == other.pass_through
			&& match (&self.projections, &other.projections) {
				(None, None) => true,
				(Some(a), Some(b)) => {
					a.len() == b.len()
						&& a.iter().zip(b).all(|(x, y)| {
							EquivalenceContext::equivalent(x, y)
						})
				}
				_ => false,
			} && self.emit_element == other.emit_element
			&& self.element_type.same_type(&other.element_type)
			&& match (&self.ordinality_type, &other.ordinality_type) {
				(None, None) => true,
				(Some(a), Some(b)) => a.same_type(b),
				_ => false,
			} && self.shuffle == other.shuffle
	}
}

/// A caller-specified reordering of assembled output columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shuffle {
	Identity,
	/// `output[i] = input[indexes[i]]`.
	Explicit(Vec<usize>),
}

impl Shuffle {
	/// Applies the shuffle; `None` when an index is out of range, which is
	/// a user-facing column count mismatch, not a panic.
	pub fn apply<T: Clone>(&self, items: &[T]) -> Option<Vec<T>> {
		match self {
			Shuffle::Identity => Some(items.to_vec()),
			Shuffle::Explicit(indexes) => indexes
				.iter()
				.map(|&index| items.get(index).cloned())
				.collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity_shuffle_preserves_order() {
		assert_eq!(Shuffle::Identity.apply(&[1, 2, 3]), Some(vec![1, 2, 3]));
	}

	#[test]
	fn explicit_shuffle_reorders_and_may_duplicate() {
		let shuffle = Shuffle::Explicit(vec![2, 0, 2]);
		assert_eq!(shuffle.apply(&[10, 20, 30]), Some(vec![30, 10, 30]));
	}

	#[test]
	fn out_of_range_shuffle_is_rejected() {
		let shuffle = Shuffle::Explicit(vec![0, 3]);
		assert_eq!(shuffle.apply(&[1, 2, 3]), None);
	}
}
