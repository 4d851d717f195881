// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! Type nodes of the IR.
//!
//! Two notions of sameness exist and must not be confused:
//! [`TypeNode::same_type`] is structural (tag, nullability and recursively
//! all substructure), while `Rc::ptr_eq` identity is used only by the
//! rewrite framework for substitution bookkeeping.

mod registry;

use std::{
	fmt::{Display, Formatter},
	rc::Rc,
};

use serde::{Deserialize, Serialize};
use zetaflow_diagnostic::Span;

pub use registry::{NameGen, StructRegistry};

pub type TypeRef = Rc<TypeNode>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeNode {
	pub span: Span,
	pub nullable: bool,
	pub kind: TypeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeKind {
	/// Placeholder for positions where the final type is decided by the
	/// code generator, never by this backend.
	Any,
	Bool,
	Int4,
	Int8,
	Float8,
	Utf8,
	USize,
	Decimal {
		precision: u32,
		scale: u32,
	},
	Binary {
		precision: u32,
	},
	/// Specialized fixed-width binary representation, produced by the
	/// binary specialization pass for precision 256.
	Binary256,
	Struct(StructType),
	Tuple(Vec<TypeRef>),
	RawTuple(Vec<TypeRef>),
	Array(TypeRef),
	Map {
		key: TypeRef,
		value: TypeRef,
	},
	ZSet(TypeRef),
	IndexedZSet {
		key: TypeRef,
		value: TypeRef,
	},
	/// At most two levels of stream nesting are supported; `outer_circuit`
	/// marks the outer one.
	Stream {
		element: TypeRef,
		outer_circuit: bool,
	},
	Function {
		parameters: Vec<TypeRef>,
		result: TypeRef,
	},
}

/// A named struct type as declared by the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructType {
	/// Qualified name as written in the query.
	pub name: String,
	/// Deterministic identifier safe for the emitted target language.
	pub sanitized_name: String,
	pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructField {
	pub name: String,
	pub ty: TypeRef,
}

impl TypeNode {
	pub fn new(kind: TypeKind, nullable: bool, span: Span) -> TypeRef {
		if let TypeKind::RawTuple(_) = kind {
			assert!(!nullable, "raw tuples are never nullable");
		}
		Rc::new(Self {
			span,
			nullable,
			kind,
		})
	}

	pub fn any() -> TypeRef {
		Self::new(TypeKind::Any, false, Span::synthetic())
	}

	pub fn bool(nullable: bool) -> TypeRef {
		Self::new(TypeKind::Bool, nullable, Span::synthetic())
	}

	pub fn int4(nullable: bool) -> TypeRef {
		Self::new(TypeKind::Int4, nullable, Span::synthetic())
	}

	pub fn int8(nullable: bool) -> TypeRef {
		Self::new(TypeKind::Int8, nullable, Span::synthetic())
	}

	pub fn float8(nullable: bool) -> TypeRef {
		Self::new(TypeKind::Float8, nullable, Span::synthetic())
	}

	pub fn utf8(nullable: bool) -> TypeRef {
		Self::new(TypeKind::Utf8, nullable, Span::synthetic())
	}

	pub fn usize() -> TypeRef {
		Self::new(TypeKind::USize, false, Span::synthetic())
	}

	pub fn decimal(precision: u32, scale: u32, nullable: bool) -> TypeRef {
		Self::new(
			TypeKind::Decimal {
				precision,
				scale,
			},
			nullable,
			Span::synthetic(),
		)
	}

	pub fn binary(precision: u32, nullable: bool) -> TypeRef {
		Self::new(
			TypeKind::Binary {
				precision,
			},
			nullable,
			Span::synthetic(),
		)
	}

	pub fn binary256(nullable: bool) -> TypeRef {
		Self::new(TypeKind::Binary256, nullable, Span::synthetic())
	}

	pub fn tuple(fields: Vec<TypeRef>, nullable: bool) -> TypeRef {
		Self::new(TypeKind::Tuple(fields), nullable, Span::synthetic())
	}

	pub fn raw_tuple(fields: Vec<TypeRef>) -> TypeRef {
		Self::new(TypeKind::RawTuple(fields), false, Span::synthetic())
	}

	pub fn array(element: TypeRef, nullable: bool) -> TypeRef {
		Self::new(TypeKind::Array(element), nullable, Span::synthetic())
	}

	pub fn map(key: TypeRef, value: TypeRef, nullable: bool) -> TypeRef {
		Self::new(
			TypeKind::Map {
				key,
				value,
			},
			nullable,
			Span::synthetic(),
		)
	}

	pub fn zset(element: TypeRef) -> TypeRef {
		Self::new(TypeKind::ZSet(element), false, Span::synthetic())
	}

	pub fn indexed_zset(key: TypeRef, value: TypeRef) -> TypeRef {
		Self::new(
			TypeKind::IndexedZSet {
				key,
				value,
			},
			false,
			Span::synthetic(),
		)
	}

	pub fn stream(element: TypeRef, outer_circuit: bool) -> TypeRef {
		Self::new(
			TypeKind::Stream {
				element,
				outer_circuit,
			},
			false,
			Span::synthetic(),
		)
	}

	pub fn function(parameters: Vec<TypeRef>, result: TypeRef) -> TypeRef {
		Self::new(
			TypeKind::Function {
				parameters,
				result,
			},
			false,
			Span::synthetic(),
		)
	}

	/// Structural type equality: tag, nullability and all substructure.
	pub fn same_type(&self, other: &TypeNode) -> bool {
		if self.nullable != other.nullable {
			return false;
		}
		match (&self.kind, &other.kind) {
			(TypeKind::Any, TypeKind::Any)
			| (TypeKind::Bool, TypeKind::Bool)
			| (TypeKind::Int4, TypeKind::Int4)
			| (TypeKind::Int8, TypeKind::Int8)
			| (TypeKind::Float8, TypeKind::Float8)
			| (TypeKind::Utf8, TypeKind::Utf8)
			| (TypeKind::USize, TypeKind::USize)
			| (TypeKind::Binary256, TypeKind::Binary256) => true,
			(
				TypeKind::Decimal {
					precision: p1,
					scale: s1,
				},
				TypeKind::Decimal {
					precision: p2,
					scale: s2,
				},
			) => p1 == p2 && s1 == s2,
			(
				TypeKind::Binary {
					precision: p1,
				},
				TypeKind::Binary {
					precision: p2,
				},
			) => p1 == p2,
			(TypeKind::Struct(a), TypeKind::Struct(b)) => {
				a.name == b.name
					&& a.fields.len() == b.fields.len()
					&& a.fields.iter().zip(&b.fields).all(|(x, y)| {
						x.name == y.name && x.ty.same_type(&y.ty)
					})
			}
			(TypeKind::Tuple(a), TypeKind::Tuple(b))
			| (TypeKind::RawTuple(a), TypeKind::RawTuple(b)) => {
				a.len() == b.len()
					&& a.iter().zip(b).all(|(x, y)| x.same_type(y))
			}
			(TypeKind::Array(a), TypeKind::Array(b)) => a.same_type(b),
			(
				TypeKind::Map {
					key: k1,
					value: v1,
				},
				TypeKind::Map {
					key: k2,
					value: v2,
				},
			) => k1.same_type(k2) && v1.same_type(v2),
			(TypeKind::ZSet(a), TypeKind::ZSet(b)) => a.same_type(b),
			(
				TypeKind::IndexedZSet {
					key: k1,
					value: v1,
				},
				TypeKind::IndexedZSet {
					key: k2,
					value: v2,
				},
			) => k1.same_type(k2) && v1.same_type(v2),
			(
				TypeKind::Stream {
					element: e1,
					outer_circuit: o1,
				},
				TypeKind::Stream {
					element: e2,
					outer_circuit: o2,
				},
			) => o1 == o2 && e1.same_type(e2),
			(
				TypeKind::Function {
					parameters: p1,
					result: r1,
				},
				TypeKind::Function {
					parameters: p2,
					result: r2,
				},
			) => {
				p1.len() == p2.len()
					&& p1.iter().zip(p2).all(|(x, y)| x.same_type(y))
					&& r1.same_type(r2)
			}
			_ => false,
		}
	}

	/// Positional element types of tuple-shaped types.
	pub fn tuple_fields(&self) -> Option<&[TypeRef]> {
		match &self.kind {
			TypeKind::Tuple(fields) | TypeKind::RawTuple(fields) => Some(fields),
			_ => None,
		}
	}

	pub fn is_any(&self) -> bool {
		matches!(self.kind, TypeKind::Any)
	}
}

pub trait TypeExt {
	/// Same type with the given nullability; returns the identical node
	/// when nothing changes.
	fn with_nullable(&self, nullable: bool) -> TypeRef;

	fn is_zset(&self) -> bool;

	fn is_indexed_zset(&self) -> bool;

	/// Element type of a `ZSet`.
	fn zset_element(&self) -> &TypeRef;

	/// Key and value types of an `IndexedZSet`.
	fn indexed_zset_parts(&self) -> (&TypeRef, &TypeRef);
}

impl TypeExt for TypeRef {
	fn with_nullable(&self, nullable: bool) -> TypeRef {
		if self.nullable == nullable {
			return self.clone();
		}
		match &self.kind {
			// A stream is a wire between operators, nullability has
			// no meaning for it.
			TypeKind::Stream {
				..
			} => panic!("cannot change nullability of a stream type"),
			_ => TypeNode::new(self.kind.clone(), nullable, self.span.clone()),
		}
	}

	fn is_zset(&self) -> bool {
		matches!(self.kind, TypeKind::ZSet(_))
	}

	fn is_indexed_zset(&self) -> bool {
		matches!(
			self.kind,
			TypeKind::IndexedZSet {
				..
			}
		)
	}

	fn zset_element(&self) -> &TypeRef {
		match &self.kind {
			TypeKind::ZSet(element) => element,
			_ => panic!("expected a zset type, found {}", self),
		}
	}

	fn indexed_zset_parts(&self) -> (&TypeRef, &TypeRef) {
		match &self.kind {
			TypeKind::IndexedZSet {
				key,
				value,
			} => (key, value),
			_ => panic!("expected an indexed zset type, found {}", self),
		}
	}
}

impl Display for TypeNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match &self.kind {
			TypeKind::Any => f.write_str("_")?,
			TypeKind::Bool => f.write_str("bool")?,
			TypeKind::Int4 => f.write_str("i32")?,
			TypeKind::Int8 => f.write_str("i64")?,
			TypeKind::Float8 => f.write_str("f64")?,
			TypeKind::Utf8 => f.write_str("string")?,
			TypeKind::USize => f.write_str("usize")?,
			TypeKind::Decimal {
				precision,
				scale,
			} => write!(f, "decimal({}, {})", precision, scale)?,
			TypeKind::Binary {
				precision,
			} => write!(f, "binary({})", precision)?,
			TypeKind::Binary256 => f.write_str("binary256")?,
			TypeKind::Struct(st) => write!(f, "struct {}", st.name)?,
			TypeKind::Tuple(fields) => {
				f.write_str("Tuple(")?;
				write_list(f, fields)?;
				f.write_str(")")?
			}
			TypeKind::RawTuple(fields) => {
				f.write_str("(")?;
				write_list(f, fields)?;
				f.write_str(")")?
			}
			TypeKind::Array(element) => write!(f, "[{}]", element)?,
			TypeKind::Map {
				key,
				value,
			} => write!(f, "map<{}, {}>", key, value)?,
			TypeKind::ZSet(element) => write!(f, "zset<{}>", element)?,
			TypeKind::IndexedZSet {
				key,
				value,
			} => write!(f, "indexed_zset<{}, {}>", key, value)?,
			TypeKind::Stream {
				element,
				..
			} => write!(f, "stream<{}>", element)?,
			TypeKind::Function {
				parameters,
				result,
			} => {
				f.write_str("fn(")?;
				write_list(f, parameters)?;
				write!(f, ") -> {}", result)?
			}
		}
		if self.nullable {
			f.write_str("?")?;
		}
		Ok(())
	}
}

fn write_list(f: &mut Formatter<'_>, items: &[TypeRef]) -> std::fmt::Result {
	for (index, item) in items.iter().enumerate() {
		if index > 0 {
			f.write_str(", ")?;
		}
		Display::fmt(item, f)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_type_is_structural() {
		let a = TypeNode::tuple(vec![TypeNode::int4(false), TypeNode::utf8(true)], false);
		let b = TypeNode::tuple(vec![TypeNode::int4(false), TypeNode::utf8(true)], false);
		assert!(!Rc::ptr_eq(&a, &b));
		assert!(a.same_type(&b));
	}

	#[test]
	fn nullability_distinguishes_types() {
		let a = TypeNode::int4(false);
		let b = TypeNode::int4(true);
		assert!(!a.same_type(&b));
	}

	#[test]
	fn with_nullable_is_identity_when_unchanged() {
		let a = TypeNode::utf8(true);
		assert!(Rc::ptr_eq(&a, &a.with_nullable(true)));
		assert!(!a.with_nullable(false).nullable);
	}

	#[test]
	#[should_panic(expected = "nullability of a stream")]
	fn stream_nullability_is_a_contract_violation() {
		let stream = TypeNode::stream(TypeNode::zset(TypeNode::int4(false)), true);
		let _ = stream.with_nullable(true);
	}

	#[test]
	fn struct_same_type_compares_name_and_fields() {
		let fields = vec![StructField {
			name: "id".to_string(),
			ty: TypeNode::int8(false),
		}];
		let a = TypeNode::new(
			TypeKind::Struct(StructType {
				name: "s.person".to_string(),
				sanitized_name: "struct_0".to_string(),
				fields: fields.clone(),
			}),
			false,
			Span::synthetic(),
		);
		let b = TypeNode::new(
			TypeKind::Struct(StructType {
				name: "s.person".to_string(),
				sanitized_name: "struct_1".to_string(),
				fields,
			}),
			false,
			Span::synthetic(),
		);
		// The sanitized name is naming state, not type structure.
		assert!(a.same_type(&b));
	}
}
