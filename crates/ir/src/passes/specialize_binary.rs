// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use tracing::debug;

use crate::{
	rewrite::{RewriteMemo, Rewriter},
	types::{TypeKind, TypeNode, TypeRef},
};

/// Replaces 256-bit binary types with the dedicated fixed-width
/// representation, keeping nullability and span. Every other precision is
/// left untouched, node identity included.
///
/// Binary literals carry their bytes unchanged; rewriting the literal's
/// type is all that is needed, and the generic expression walk does that.
#[derive(Debug, Default)]
pub struct SpecializeBinary {
	memo: RewriteMemo,
}

impl SpecializeBinary {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Rewriter for SpecializeBinary {
	fn memo(&mut self) -> &mut RewriteMemo {
		&mut self.memo
	}

	fn rewrite_type(&mut self, ty: &TypeRef) -> TypeRef {
		match &ty.kind {
			TypeKind::Binary {
				precision: 256,
			} => {
				debug!(nullable = ty.nullable, "specializing 256-bit binary type");
				TypeNode::new(TypeKind::Binary256, ty.nullable, ty.span.clone())
			}
			_ => self.walk_type(ty),
		}
	}
}
