// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use tracing::debug;

use crate::{
	rewrite::{RewriteMemo, Rewriter},
	types::{TypeKind, TypeNode, TypeRef},
};

/// Replaces every struct type with a tuple of its field types, in field
/// declaration order. Field names are dropped; positions are already fixed
/// by the front end, so downstream consumers address columns by index only.
///
/// The replacement keeps the struct's nullability and span. The pass is
/// total and idempotent: its output contains no struct type anywhere.
#[derive(Debug, Default)]
pub struct EliminateStructs {
	memo: RewriteMemo,
}

impl EliminateStructs {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Rewriter for EliminateStructs {
	fn memo(&mut self) -> &mut RewriteMemo {
		&mut self.memo
	}

	fn rewrite_type(&mut self, ty: &TypeRef) -> TypeRef {
		let TypeKind::Struct(st) = &ty.kind else {
			return self.walk_type(ty);
		};
		debug!(name = %st.name, fields = st.fields.len(), "eliminating struct type");
		let fields = st.fields.iter().map(|field| self.fold_type(&field.ty)).collect();
		TypeNode::new(TypeKind::Tuple(fields), ty.nullable, ty.span.clone())
	}
}

#[cfg(test)]
mod tests {
	use std::rc::Rc;

	use super::*;
	use crate::{
		expr::{ExprBuild, ExprNode},
		types::{StructField, StructType},
	};

	fn person() -> TypeRef {
		TypeNode::new(
			TypeKind::Struct(StructType {
				name: "PERSON".into(),
				sanitized_name: "struct_0".into(),
				fields: vec![
					StructField {
						name: "name".into(),
						ty: TypeNode::utf8(false),
					},
					StructField {
						name: "age".into(),
						ty: TypeNode::int4(true),
					},
				],
			}),
			true,
			zetaflow_diagnostic::Span::synthetic(),
		)
	}

	fn contains_struct(ty: &TypeRef) -> bool {
		match &ty.kind {
			TypeKind::Struct(_) => true,
			TypeKind::Tuple(fields) | TypeKind::RawTuple(fields) => {
				fields.iter().any(contains_struct)
			}
			TypeKind::Array(element)
			| TypeKind::ZSet(element)
			| TypeKind::Stream {
				element,
				..
			} => contains_struct(element),
			TypeKind::Map {
				key,
				value,
			}
			| TypeKind::IndexedZSet {
				key,
				value,
			} => contains_struct(key) || contains_struct(value),
			TypeKind::Function {
				parameters,
				result,
			} => parameters.iter().any(contains_struct) || contains_struct(result),
			_ => false,
		}
	}

	#[test]
	fn struct_becomes_tuple_with_same_nullability() {
		let mut pass = EliminateStructs::new();
		let rewritten = pass.fold_type(&person());
		assert!(rewritten.nullable);
		let TypeKind::Tuple(fields) = &rewritten.kind else {
			panic!("expected a tuple");
		};
		assert_eq!(fields.len(), 2);
		assert!(fields[0].same_type(&TypeNode::utf8(false)));
		assert!(fields[1].same_type(&TypeNode::int4(true)));
	}

	#[test]
	fn elimination_is_total_through_containers() {
		let nested = TypeNode::zset(TypeNode::tuple(
			vec![person(), TypeNode::array(person(), false)],
			false,
		));
		let mut pass = EliminateStructs::new();
		let rewritten = pass.fold_type(&nested);
		assert!(!contains_struct(&rewritten));
	}

	#[test]
	fn struct_free_subtrees_keep_their_identity() {
		let plain = TypeNode::tuple(vec![TypeNode::int4(false)], false);
		let mut pass = EliminateStructs::new();
		let rewritten = pass.fold_type(&plain);
		assert!(Rc::ptr_eq(&rewritten, &plain));
	}

	#[test]
	fn shared_struct_rewrites_to_one_node() {
		let shared = person();
		let pair = TypeNode::tuple(vec![shared.clone(), shared], false);
		let mut pass = EliminateStructs::new();
		let rewritten = pass.fold_type(&pair);
		let TypeKind::Tuple(fields) = &rewritten.kind else {
			panic!("expected a tuple");
		};
		assert!(Rc::ptr_eq(&fields[0], &fields[1]));
	}

	#[test]
	fn expression_types_are_rewritten_too() {
		let expr = ExprNode::variable("row", person()).field(1);
		let mut pass = EliminateStructs::new();
		let rewritten = pass.fold_expr(&expr);
		assert!(!contains_struct(&rewritten.ty));
	}
}
