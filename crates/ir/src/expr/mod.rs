// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! Expression and statement nodes of the IR.
//!
//! Every expression is statically typed. Nodes are immutable once built and
//! shared through `Rc`; "rewriting" always produces new nodes.

mod aggregate;
mod flatmap;
mod stmt;

use std::{
	fmt::{Display, Formatter},
	rc::Rc,
};

use serde::{Deserialize, Serialize};
use zetaflow_diagnostic::Span;

use crate::types::{TypeExt, TypeKind, TypeNode, TypeRef};

pub use aggregate::{AggregateSpec, FoldSpec};
pub use flatmap::{FlatMapSpec, Shuffle};
pub use stmt::Stmt;

pub type ExprRef = Rc<ExprNode>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExprNode {
	pub span: Span,
	pub ty: TypeRef,
	pub kind: ExprKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
	Literal(Literal),
	Variable(String),
	/// Positional field access into a tuple- or struct-typed value.
	Field {
		source: ExprRef,
		index: usize,
	},
	/// Invocation of a constructor of the target runtime, e.g. a fold.
	Constructor {
		function: ExprRef,
		arguments: Vec<ExprRef>,
	},
	/// Application of a closure-valued expression.
	Apply {
		function: ExprRef,
		arguments: Vec<ExprRef>,
	},
	/// Method-style application on a receiver.
	Method {
		receiver: ExprRef,
		method: String,
		arguments: Vec<ExprRef>,
	},
	Binary {
		op: BinaryOp,
		left: ExprRef,
		right: ExprRef,
	},
	Unary {
		op: UnaryOp,
		operand: ExprRef,
	},
	If {
		condition: ExprRef,
		then_branch: ExprRef,
		else_branch: ExprRef,
	},
	/// Conversion to the node's own type.
	Cast {
		source: ExprRef,
	},
	Closure {
		parameters: Vec<Parameter>,
		body: ExprRef,
	},
	Block {
		statements: Vec<Stmt>,
		result: ExprRef,
	},
	/// Tuple construction; `raw` distinguishes the target's native tuples
	/// from the row tuples of the runtime.
	Tuple {
		elements: Vec<ExprRef>,
		raw: bool,
	},
	VecLiteral {
		elements: Vec<ExprRef>,
	},
	/// Wraps a value into the nullable version of its type.
	Some(ExprRef),
	/// Nullable unwrap-or-propagate (`e?`). The source must be nullable
	/// or a placeholder; anything else is a bug in the producing pass.
	Question(ExprRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
	Bool(bool),
	Int4(i32),
	Int8(i64),
	Float8(f64),
	Utf8(String),
	USize(usize),
	Binary(Vec<u8>),
	/// The null of the node's (nullable) type.
	None,
	/// Placeholder substituted when a lowering step failed; the
	/// compilation is already marked failed when one of these exists.
	Poison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Eq,
	Neq,
	Lt,
	Lte,
	Gt,
	Gte,
	And,
	Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
	Not,
	Neg,
	IsNull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
	pub name: String,
	pub ty: TypeRef,
}

impl Parameter {
	pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
		Self {
			name: name.into(),
			ty,
		}
	}
}

impl ExprNode {
	pub fn new(kind: ExprKind, ty: TypeRef, span: Span) -> ExprRef {
		Rc::new(Self {
			span,
			ty,
			kind,
		})
	}

	pub fn literal(literal: Literal, ty: TypeRef) -> ExprRef {
		Self::new(ExprKind::Literal(literal), ty, Span::synthetic())
	}

	pub fn bool_lit(value: bool) -> ExprRef {
		Self::literal(Literal::Bool(value), TypeNode::bool(false))
	}

	pub fn int4_lit(value: i32) -> ExprRef {
		Self::literal(Literal::Int4(value), TypeNode::int4(false))
	}

	pub fn int8_lit(value: i64) -> ExprRef {
		Self::literal(Literal::Int8(value), TypeNode::int8(false))
	}

	pub fn usize_lit(value: usize) -> ExprRef {
		Self::literal(Literal::USize(value), TypeNode::usize())
	}

	pub fn utf8_lit(value: impl Into<String>) -> ExprRef {
		Self::literal(Literal::Utf8(value.into()), TypeNode::utf8(false))
	}

	pub fn binary_lit(value: Vec<u8>, ty: TypeRef) -> ExprRef {
		Self::literal(Literal::Binary(value), ty)
	}

	/// The null literal of a nullable type.
	pub fn none(ty: &TypeRef) -> ExprRef {
		assert!(ty.nullable || ty.is_any(), "none literal requires a nullable type");
		Self::literal(Literal::None, ty.clone())
	}

	/// Placeholder for a value a failed lowering step could not produce.
	pub fn poison(span: Span, ty: TypeRef) -> ExprRef {
		Self::new(ExprKind::Literal(Literal::Poison), ty, span)
	}

	pub fn variable(name: impl Into<String>, ty: TypeRef) -> ExprRef {
		Self::new(ExprKind::Variable(name.into()), ty, Span::synthetic())
	}

	pub fn tuple(elements: Vec<ExprRef>, raw: bool) -> ExprRef {
		let fields = elements.iter().map(|element| element.ty.clone()).collect();
		let ty = if raw {
			TypeNode::raw_tuple(fields)
		} else {
			TypeNode::tuple(fields, false)
		};
		Self::new(
			ExprKind::Tuple {
				elements,
				raw,
			},
			ty,
			Span::synthetic(),
		)
	}

	pub fn vec_literal(elements: Vec<ExprRef>, ty: TypeRef) -> ExprRef {
		assert!(
			matches!(ty.kind, TypeKind::Array(_)) || ty.is_any(),
			"vec literal requires an array type"
		);
		Self::new(
			ExprKind::VecLiteral {
				elements,
			},
			ty,
			Span::synthetic(),
		)
	}

	pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef, ty: TypeRef) -> ExprRef {
		Self::new(
			ExprKind::Binary {
				op,
				left,
				right,
			},
			ty,
			Span::synthetic(),
		)
	}

	pub fn unary(op: UnaryOp, operand: ExprRef, ty: TypeRef) -> ExprRef {
		Self::new(
			ExprKind::Unary {
				op,
				operand,
			},
			ty,
			Span::synthetic(),
		)
	}

	pub fn if_then(condition: ExprRef, then_branch: ExprRef, else_branch: ExprRef) -> ExprRef {
		assert!(
			matches!(condition.ty.kind, TypeKind::Bool) || condition.ty.is_any(),
			"if condition must be boolean"
		);
		let ty = then_branch.ty.clone();
		Self::new(
			ExprKind::If {
				condition,
				then_branch,
				else_branch,
			},
			ty,
			Span::synthetic(),
		)
	}

	pub fn block(statements: Vec<Stmt>, result: ExprRef) -> ExprRef {
		let ty = result.ty.clone();
		Self::new(
			ExprKind::Block {
				statements,
				result,
			},
			ty,
			Span::synthetic(),
		)
	}

	pub fn constructor(function: ExprRef, ty: TypeRef, arguments: Vec<ExprRef>) -> ExprRef {
		Self::new(
			ExprKind::Constructor {
				function,
				arguments,
			},
			ty,
			Span::synthetic(),
		)
	}

	/// Default value of a type, used when padding error rows.
	pub fn default_for(ty: &TypeRef) -> Option<ExprRef> {
		if ty.nullable {
			return Some(Self::none(ty));
		}
		let literal = match &ty.kind {
			TypeKind::Bool => Literal::Bool(false),
			TypeKind::Int4 => Literal::Int4(0),
			TypeKind::Int8 => Literal::Int8(0),
			TypeKind::Float8 => Literal::Float8(0.0),
			TypeKind::Utf8 => Literal::Utf8(String::new()),
			TypeKind::USize => Literal::USize(0),
			TypeKind::Binary {
				..
			}
			| TypeKind::Binary256 => Literal::Binary(Vec::new()),
			_ => return None,
		};
		Some(Self::literal(literal, ty.clone()))
	}
}

/// Fluent builders mirroring how lowering assembles operator bodies.
pub trait ExprBuild {
	fn field(&self, index: usize) -> ExprRef;

	/// A `clone` of this value; lowered bodies copy row fields into
	/// locals instead of borrowing them.
	fn clone_expr(&self) -> ExprRef;

	fn is_null(&self) -> ExprRef;

	fn unwrap(&self) -> ExprRef;

	fn some(&self) -> ExprRef;

	/// The `e?` operator. Panics when the source is statically
	/// non-nullable and not a placeholder.
	fn question(&self) -> ExprRef;

	fn cast(&self, ty: TypeRef) -> ExprRef;

	fn call(&self, arguments: Vec<ExprRef>) -> ExprRef;

	fn method(&self, method: &str, ty: TypeRef, arguments: Vec<ExprRef>) -> ExprRef;

	fn closure(&self, parameters: Vec<Parameter>) -> ExprRef;

	/// Structural copy with no shared nodes, for rewrites that must not
	/// alias the original.
	fn deep_copy(&self) -> ExprRef;
}

impl ExprBuild for ExprRef {
	fn field(&self, index: usize) -> ExprRef {
		let ty = match &self.ty.kind {
			TypeKind::Tuple(fields) | TypeKind::RawTuple(fields) => fields
				.get(index)
				.unwrap_or_else(|| {
					panic!(
						"field index {} out of bounds for {}",
						index, self.ty
					)
				})
				.clone(),
			TypeKind::Struct(st) => st
				.fields
				.get(index)
				.unwrap_or_else(|| {
					panic!(
						"field index {} out of bounds for {}",
						index, self.ty
					)
				})
				.ty
				.clone(),
			TypeKind::Any => TypeNode::any(),
			_ => panic!("field access on non-composite type {}", self.ty),
		};
		ExprNode::new(
			ExprKind::Field {
				source: self.clone(),
				index,
			},
			ty,
			self.span.clone(),
		)
	}

	fn clone_expr(&self) -> ExprRef {
		ExprNode::new(
			ExprKind::Method {
				receiver: self.clone(),
				method: "clone".to_string(),
				arguments: Vec::new(),
			},
			self.ty.clone(),
			self.span.clone(),
		)
	}

	fn is_null(&self) -> ExprRef {
		ExprNode::new(
			ExprKind::Unary {
				op: UnaryOp::IsNull,
				operand: self.clone(),
			},
			TypeNode::bool(false),
			self.span.clone(),
		)
	}

	fn unwrap(&self) -> ExprRef {
		assert!(
			self.ty.nullable || self.ty.is_any(),
			"unwrap of a non-nullable expression"
		);
		ExprNode::new(
			ExprKind::Method {
				receiver: self.clone(),
				method: "unwrap".to_string(),
				arguments: Vec::new(),
			},
			self.ty.with_nullable(false),
			self.span.clone(),
		)
	}

	fn some(&self) -> ExprRef {
		ExprNode::new(
			ExprKind::Some(self.clone()),
			self.ty.with_nullable(true),
			self.span.clone(),
		)
	}

	fn question(&self) -> ExprRef {
		assert!(
			self.ty.nullable || self.ty.is_any(),
			"question operator on a non-nullable expression"
		);
		ExprNode::new(
			ExprKind::Question(self.clone()),
			self.ty.with_nullable(false),
			self.span.clone(),
		)
	}

	fn cast(&self, ty: TypeRef) -> ExprRef {
		ExprNode::new(
			ExprKind::Cast {
				source: self.clone(),
			},
			ty,
			self.span.clone(),
		)
	}

	fn call(&self, arguments: Vec<ExprRef>) -> ExprRef {
		let ty = match (&self.kind, &self.ty.kind) {
			(
				ExprKind::Closure {
					body,
					..
				},
				_,
			) => body.ty.clone(),
			(
				_,
				TypeKind::Function {
					result,
					..
				},
			) => result.clone(),
			_ => TypeNode::any(),
		};
		ExprNode::new(
			ExprKind::Apply {
				function: self.clone(),
				arguments,
			},
			ty,
			self.span.clone(),
		)
	}

	fn method(&self, method: &str, ty: TypeRef, arguments: Vec<ExprRef>) -> ExprRef {
		ExprNode::new(
			ExprKind::Method {
				receiver: self.clone(),
				method: method.to_string(),
				arguments,
			},
			ty,
			self.span.clone(),
		)
	}

	fn closure(&self, parameters: Vec<Parameter>) -> ExprRef {
		let ty = TypeNode::function(
			parameters.iter().map(|parameter| parameter.ty.clone()).collect(),
			self.ty.clone(),
		);
		ExprNode::new(
			ExprKind::Closure {
				parameters,
				body: self.clone(),
			},
			ty,
			self.span.clone(),
		)
	}

	fn deep_copy(&self) -> ExprRef {
		let kind = match &self.kind {
			ExprKind::Literal(literal) => ExprKind::Literal(literal.clone()),
			ExprKind::Variable(name) => ExprKind::Variable(name.clone()),
			ExprKind::Field {
				source,
				index,
			} => ExprKind::Field {
				source: source.deep_copy(),
				index: *index,
			},
			ExprKind::Constructor {
				function,
				arguments,
			} => ExprKind::Constructor {
				function: function.deep_copy(),
				arguments: arguments.iter().map(ExprBuild::deep_copy).collect(),
			},
			ExprKind::Apply {
				function,
				arguments,
			} => ExprKind::Apply {
				function: function.deep_copy(),
				arguments: arguments.iter().map(ExprBuild::deep_copy).collect(),
			},
			ExprKind::Method {
				receiver,
				method,
				arguments,
			} => ExprKind::Method {
				receiver: receiver.deep_copy(),
				method: method.clone(),
				arguments: arguments.iter().map(ExprBuild::deep_copy).collect(),
			},
			ExprKind::Binary {
				op,
				left,
				right,
			} => ExprKind::Binary {
				op: *op,
				left: left.deep_copy(),
				right: right.deep_copy(),
			},
			ExprKind::Unary {
				op,
				operand,
			} => ExprKind::Unary {
				op: *op,
				operand: operand.deep_copy(),
			},
			ExprKind::If {
				condition,
				then_branch,
				else_branch,
			} => ExprKind::If {
				condition: condition.deep_copy(),
				then_branch: then_branch.deep_copy(),
				else_branch: else_branch.deep_copy(),
			},
			ExprKind::Cast {
				source,
			} => ExprKind::Cast {
				source: source.deep_copy(),
			},
			ExprKind::Closure {
				parameters,
				body,
			} => ExprKind::Closure {
				parameters: parameters.clone(),
				body: body.deep_copy(),
			},
			ExprKind::Block {
				statements,
				result,
			} => ExprKind::Block {
				statements: statements
					.iter()
					.map(|statement| match statement {
						Stmt::Let {
							name,
							value,
						} => Stmt::Let {
							name: name.clone(),
							value: value.deep_copy(),
						},
						Stmt::Expr(value) => Stmt::Expr(value.deep_copy()),
					})
					.collect(),
				result: result.deep_copy(),
			},
			ExprKind::Tuple {
				elements,
				raw,
			} => ExprKind::Tuple {
				elements: elements.iter().map(ExprBuild::deep_copy).collect(),
				raw: *raw,
			},
			ExprKind::VecLiteral {
				elements,
			} => ExprKind::VecLiteral {
				elements: elements.iter().map(ExprBuild::deep_copy).collect(),
			},
			ExprKind::Some(source) => ExprKind::Some(source.deep_copy()),
			ExprKind::Question(source) => ExprKind::Question(source.deep_copy()),
		};
		ExprNode::new(kind, self.ty.clone(), self.span.clone())
	}
}

impl Display for ExprNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match &self.kind {
			ExprKind::Literal(Literal::Bool(value)) => write!(f, "{}", value),
			ExprKind::Literal(Literal::Int4(value)) => write!(f, "{}", value),
			ExprKind::Literal(Literal::Int8(value)) => write!(f, "{}", value),
			ExprKind::Literal(Literal::Float8(value)) => write!(f, "{}", value),
			ExprKind::Literal(Literal::Utf8(value)) => write!(f, "{:?}", value),
			ExprKind::Literal(Literal::USize(value)) => write!(f, "{}", value),
			ExprKind::Literal(Literal::Binary(bytes)) => {
				write!(f, "x'")?;
				for byte in bytes {
					write!(f, "{:02x}", byte)?;
				}
				write!(f, "'")
			}
			ExprKind::Literal(Literal::None) => f.write_str("none"),
			ExprKind::Literal(Literal::Poison) => f.write_str("<poison>"),
			ExprKind::Variable(name) => f.write_str(name),
			ExprKind::Field {
				source,
				index,
			} => write!(f, "{}.{}", source, index),
			ExprKind::Constructor {
				function,
				arguments,
			}
			| ExprKind::Apply {
				function,
				arguments,
			} => {
				write!(f, "{}(", function)?;
				write_arguments(f, arguments)?;
				f.write_str(")")
			}
			ExprKind::Method {
				receiver,
				method,
				arguments,
			} => {
				write!(f, "{}.{}(", receiver, method)?;
				write_arguments(f, arguments)?;
				f.write_str(")")
			}
			ExprKind::Binary {
				op,
				left,
				right,
			} => write!(f, "({} {} {})", left, op, right),
			ExprKind::Unary {
				op: UnaryOp::IsNull,
				operand,
			} => write!(f, "{}.is_none()", operand),
			ExprKind::Unary {
				op: UnaryOp::Not,
				operand,
			} => write!(f, "!{}", operand),
			ExprKind::Unary {
				op: UnaryOp::Neg,
				operand,
			} => write!(f, "-{}", operand),
			ExprKind::If {
				condition,
				then_branch,
				else_branch,
			} => write!(
				f,
				"if {} {{ {} }} else {{ {} }}",
				condition, then_branch, else_branch
			),
			ExprKind::Cast {
				source,
			} => write!(f, "({} as {})", source, self.ty),
			ExprKind::Closure {
				parameters,
				body,
			} => {
				f.write_str("|")?;
				for (index, parameter) in parameters.iter().enumerate() {
					if index > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{}: {}", parameter.name, parameter.ty)?;
				}
				write!(f, "| {}", body)
			}
			ExprKind::Block {
				statements,
				result,
			} => {
				f.write_str("{ ")?;
				for statement in statements {
					write!(f, "{} ", statement)?;
				}
				write!(f, "{} }}", result)
			}
			ExprKind::Tuple {
				elements,
				..
			} => {
				f.write_str("(")?;
				write_arguments(f, elements)?;
				f.write_str(")")
			}
			ExprKind::VecLiteral {
				elements,
			} => {
				f.write_str("vec![")?;
				write_arguments(f, elements)?;
				f.write_str("]")
			}
			ExprKind::Some(source) => write!(f, "Some({})", source),
			ExprKind::Question(source) => write!(f, "{}?", source),
		}
	}
}

fn write_arguments(f: &mut Formatter<'_>, arguments: &[ExprRef]) -> std::fmt::Result {
	for (index, argument) in arguments.iter().enumerate() {
		if index > 0 {
			f.write_str(", ")?;
		}
		Display::fmt(argument, f)?;
	}
	Ok(())
}

impl Display for BinaryOp {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			BinaryOp::Add => "+",
			BinaryOp::Sub => "-",
			BinaryOp::Mul => "*",
			BinaryOp::Div => "/",
			BinaryOp::Eq => "==",
			BinaryOp::Neq => "!=",
			BinaryOp::Lt => "<",
			BinaryOp::Lte => "<=",
			BinaryOp::Gt => ">",
			BinaryOp::Gte => ">=",
			BinaryOp::And => "&&",
			BinaryOp::Or => "||",
		})
	}
}
