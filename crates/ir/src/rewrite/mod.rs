// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! Identity-preserving traversal and rewriting of the expression/type DAG.
//!
//! A pass implements [`Rewriter`] and overrides the `rewrite_*` hooks. The
//! hook decides per node: return a replacement directly (stopping descent),
//! or call the matching `walk_*` to descend into children in declared order
//! and rebuild. Entry is always through `fold_*`, which memoizes by node
//! identity: a node reachable from several parents is rewritten once and
//! every occurrence resolves to the same replacement.

mod equivalence;
mod reduce;

use std::{collections::HashMap, rc::Rc};

use crate::{
	expr::{ExprKind, ExprNode, ExprRef, Parameter, Stmt},
	types::{StructField, StructType, TypeKind, TypeNode, TypeRef},
};

pub use equivalence::EquivalenceContext;
pub use reduce::{SubstituteVariables, reduce};

/// Substitution state of one rewrite pass.
///
/// Keys are node addresses; sound because the pass borrows the input tree,
/// so no original node can be dropped (and its address reused) mid-pass.
#[derive(Debug, Default)]
pub struct RewriteMemo {
	types: HashMap<usize, TypeRef>,
	exprs: HashMap<usize, ExprRef>,
	stack: Vec<usize>,
}

impl RewriteMemo {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn type_key(ty: &TypeRef) -> usize {
		Rc::as_ptr(ty) as usize
	}

	pub(crate) fn expr_key(expr: &ExprRef) -> usize {
		Rc::as_ptr(expr) as usize
	}

	fn lookup_type(&self, key: usize) -> Option<TypeRef> {
		self.types.get(&key).cloned()
	}

	fn lookup_expr(&self, key: usize) -> Option<ExprRef> {
		self.exprs.get(&key).cloned()
	}

	fn record_type(&mut self, key: usize, replacement: TypeRef) {
		self.types.insert(key, replacement);
	}

	fn record_expr(&mut self, key: usize, replacement: ExprRef) {
		self.exprs.insert(key, replacement);
	}

	fn push(&mut self, key: usize) {
		assert!(
			!self.stack.contains(&key),
			"cycle in IR graph: node is its own ancestor"
		);
		self.stack.push(key);
	}

	fn pop(&mut self, key: usize) {
		let top = self.stack.pop();
		assert_eq!(top, Some(key), "unbalanced traversal stack");
	}
}

pub trait Rewriter {
	fn memo(&mut self) -> &mut RewriteMemo;

	/// Preorder hook for types. Returning without calling
	/// [`Rewriter::walk_type`] stops descent into this subtree.
	fn rewrite_type(&mut self, ty: &TypeRef) -> TypeRef {
		self.walk_type(ty)
	}

	/// Preorder hook for expressions, same contract as `rewrite_type`.
	fn rewrite_expr(&mut self, expr: &ExprRef) -> ExprRef {
		self.walk_expr(expr)
	}

	/// Memoized entry point; re-querying an already rewritten node is
	/// idempotent and does not re-traverse it.
	fn fold_type(&mut self, ty: &TypeRef) -> TypeRef {
		let key = RewriteMemo::type_key(ty);
		if let Some(done) = self.memo().lookup_type(key) {
			return done;
		}
		self.memo().push(key);
		let result = self.rewrite_type(ty);
		self.memo().pop(key);
		self.memo().record_type(key, result.clone());
		result
	}

	fn fold_expr(&mut self, expr: &ExprRef) -> ExprRef {
		let key = RewriteMemo::expr_key(expr);
		if let Some(done) = self.memo().lookup_expr(key) {
			return done;
		}
		self.memo().push(key);
		let result = self.rewrite_expr(expr);
		self.memo().pop(key);
		self.memo().record_expr(key, result.clone());
		result
	}

	fn fold_stmt(&mut self, stmt: &Stmt) -> Stmt {
		match stmt {
			Stmt::Let {
				name,
				value,
			} => Stmt::Let {
				name: name.clone(),
				value: self.fold_expr(value),
			},
			Stmt::Expr(value) => Stmt::Expr(self.fold_expr(value)),
		}
	}

	/// Descends into a type's children in declared order and rebuilds;
	/// returns the original node when nothing changed underneath.
	fn walk_type(&mut self, ty: &TypeRef) -> TypeRef {
		let kind = match &ty.kind {
			TypeKind::Struct(st) => {
				let fields: Vec<StructField> = st
					.fields
					.iter()
					.map(|field| StructField {
						name: field.name.clone(),
						ty: self.fold_type(&field.ty),
					})
					.collect();
				if fields
					.iter()
					.zip(&st.fields)
					.all(|(new, old)| Rc::ptr_eq(&new.ty, &old.ty))
				{
					return ty.clone();
				}
				TypeKind::Struct(StructType {
					name: st.name.clone(),
					sanitized_name: st.sanitized_name.clone(),
					fields,
				})
			}
			TypeKind::Tuple(fields) => {
				let (new, changed) = self.fold_types(fields);
				if !changed {
					return ty.clone();
				}
				TypeKind::Tuple(new)
			}
			TypeKind::RawTuple(fields) => {
				let (new, changed) = self.fold_types(fields);
				if !changed {
					return ty.clone();
				}
				TypeKind::RawTuple(new)
			}
			TypeKind::Array(element) => {
				let new = self.fold_type(element);
				if Rc::ptr_eq(&new, element) {
					return ty.clone();
				}
				TypeKind::Array(new)
			}
			TypeKind::Map {
				key,
				value,
			} => {
				let new_key = self.fold_type(key);
				let new_value = self.fold_type(value);
				if Rc::ptr_eq(&new_key, key) && Rc::ptr_eq(&new_value, value) {
					return ty.clone();
				}
				TypeKind::Map {
					key: new_key,
					value: new_value,
				}
			}
			TypeKind::ZSet(element) => {
				let new = self.fold_type(element);
				if Rc::ptr_eq(&new, element) {
					return ty.clone();
				}
				TypeKind::ZSet(new)
			}
			TypeKind::IndexedZSet {
				key,
				value,
			} => {
				let new_key = self.fold_type(key);
				let new_value = self.fold_type(value);
				if Rc::ptr_eq(&new_key, key) && Rc::ptr_eq(&new_value, value) {
					return ty.clone();
				}
				TypeKind::IndexedZSet {
					key: new_key,
					value: new_value,
				}
			}
			TypeKind::Stream {
				element,
				outer_circuit,
			} => {
				let new = self.fold_type(element);
				if Rc::ptr_eq(&new, element) {
					return ty.clone();
				}
				TypeKind::Stream {
					element: new,
					outer_circuit: *outer_circuit,
				}
			}
			TypeKind::Function {
				parameters,
				result,
			} => {
				let (new_parameters, parameters_changed) =
					self.fold_types(parameters);
				let new_result = self.fold_type(result);
				if !parameters_changed && Rc::ptr_eq(&new_result, result) {
					return ty.clone();
				}
				TypeKind::Function {
					parameters: new_parameters,
					result: new_result,
				}
			}
			// Leaf kinds have no substructure.
			_ => return ty.clone(),
		};
		TypeNode::new(kind, ty.nullable, ty.span.clone())
	}

	fn fold_types(&mut self, types: &[TypeRef]) -> (Vec<TypeRef>, bool) {
		let new: Vec<TypeRef> = types.iter().map(|ty| self.fold_type(ty)).collect();
		let changed = new.iter().zip(types).any(|(a, b)| !Rc::ptr_eq(a, b));
		(new, changed)
	}

	fn fold_exprs(&mut self, exprs: &[ExprRef]) -> (Vec<ExprRef>, bool) {
		let new: Vec<ExprRef> = exprs.iter().map(|expr| self.fold_expr(expr)).collect();
		let changed = new.iter().zip(exprs).any(|(a, b)| !Rc::ptr_eq(a, b));
		(new, changed)
	}

	/// Descends into an expression's type and children in declared order
	/// and rebuilds; returns the original node when nothing changed.
	fn walk_expr(&mut self, expr: &ExprRef) -> ExprRef {
		let ty = self.fold_type(&expr.ty);
		let mut changed = !Rc::ptr_eq(&ty, &expr.ty);
		let kind = match &expr.kind {
			ExprKind::Literal(literal) => ExprKind::Literal(literal.clone()),
			ExprKind::Variable(name) => ExprKind::Variable(name.clone()),
			ExprKind::Field {
				source,
				index,
			} => {
				let new = self.fold_expr(source);
				changed |= !Rc::ptr_eq(&new, source);
				ExprKind::Field {
					source: new,
					index: *index,
				}
			}
			ExprKind::Constructor {
				function,
				arguments,
			} => {
				let new_function = self.fold_expr(function);
				let (new_arguments, arguments_changed) = self.fold_exprs(arguments);
				changed |= !Rc::ptr_eq(&new_function, function) || arguments_changed;
				ExprKind::Constructor {
					function: new_function,
					arguments: new_arguments,
				}
			}
			ExprKind::Apply {
				function,
				arguments,
			} => {
				let new_function = self.fold_expr(function);
				let (new_arguments, arguments_changed) = self.fold_exprs(arguments);
				changed |= !Rc::ptr_eq(&new_function, function) || arguments_changed;
				ExprKind::Apply {
					function: new_function,
					arguments: new_arguments,
				}
			}
			ExprKind::Method {
				receiver,
				method,
				arguments,
			} => {
				let new_receiver = self.fold_expr(receiver);
				let (new_arguments, arguments_changed) = self.fold_exprs(arguments);
				changed |= !Rc::ptr_eq(&new_receiver, receiver) || arguments_changed;
				ExprKind::Method {
					receiver: new_receiver,
					method: method.clone(),
					arguments: new_arguments,
				}
			}
			ExprKind::Binary {
				op,
				left,
				right,
			} => {
				let new_left = self.fold_expr(left);
				let new_right = self.fold_expr(right);
				changed |= !Rc::ptr_eq(&new_left, left) || !Rc::ptr_eq(&new_right, right);
				ExprKind::Binary {
					op: *op,
					left: new_left,
					right: new_right,
				}
			}
			ExprKind::Unary {
				op,
				operand,
			} => {
				let new = self.fold_expr(operand);
				changed |= !Rc::ptr_eq(&new, operand);
				ExprKind::Unary {
					op: *op,
					operand: new,
				}
			}
			ExprKind::If {
				condition,
				then_branch,
				else_branch,
			} => {
				let new_condition = self.fold_expr(condition);
				let new_then = self.fold_expr(then_branch);
				let new_else = self.fold_expr(else_branch);
				changed |= !Rc::ptr_eq(&new_condition, condition)
					|| !Rc::ptr_eq(&new_then, then_branch)
					|| !Rc::ptr_eq(&new_else, else_branch);
				ExprKind::If {
					condition: new_condition,
					then_branch: new_then,
					else_branch: new_else,
				}
			}
			ExprKind::Cast {
				source,
			} => {
				let new = self.fold_expr(source);
				changed |= !Rc::ptr_eq(&new, source);
				ExprKind::Cast {
					source: new,
				}
			}
			ExprKind::Closure {
				parameters,
				body,
			} => {
				let new_parameters: Vec<Parameter> = parameters
					.iter()
					.map(|parameter| Parameter {
						name: parameter.name.clone(),
						ty: self.fold_type(&parameter.ty),
					})
					.collect();
				let new_body = self.fold_expr(body);
				changed |= new_parameters
					.iter()
					.zip(parameters)
					.any(|(a, b)| !Rc::ptr_eq(&a.ty, &b.ty))
					|| !Rc::ptr_eq(&new_body, body);
				ExprKind::Closure {
					parameters: new_parameters,
					body: new_body,
				}
			}
			ExprKind::Block {
				statements,
				result,
			} => {
				let new_statements: Vec<Stmt> = statements
					.iter()
					.map(|statement| self.fold_stmt(statement))
					.collect();
				let new_result = self.fold_expr(result);
				changed |= new_statements
					.iter()
					.zip(statements)
					.any(|(a, b)| !same_stmt_nodes(a, b))
					|| !Rc::ptr_eq(&new_result, result);
				ExprKind::Block {
					statements: new_statements,
					result: new_result,
				}
			}
			ExprKind::Tuple {
				elements,
				raw,
			} => {
				let (new_elements, elements_changed) = self.fold_exprs(elements);
				changed |= elements_changed;
				ExprKind::Tuple {
					elements: new_elements,
					raw: *raw,
				}
			}
			ExprKind::VecLiteral {
				elements,
			} => {
				let (new_elements, elements_changed) = self.fold_exprs(elements);
				changed |= elements_changed;
				ExprKind::VecLiteral {
					elements: new_elements,
				}
			}
			ExprKind::Some(source) => {
				let new = self.fold_expr(source);
				changed |= !Rc::ptr_eq(&new, source);
				ExprKind::Some(new)
			}
			ExprKind::Question(source) => {
				let new = self.fold_expr(source);
				changed |= !Rc::ptr_eq(&new, source);
				ExprKind::Question(new)
			}
		};
		if !changed {
			return expr.clone();
		}
		ExprNode::new(kind, ty, expr.span.clone())
	}
}

fn same_stmt_nodes(a: &Stmt, b: &Stmt) -> bool {
	match (a, b) {
		(
			Stmt::Let {
				value: va,
				..
			},
			Stmt::Let {
				value: vb,
				..
			},
		) => Rc::ptr_eq(va, vb),
		(Stmt::Expr(va), Stmt::Expr(vb)) => Rc::ptr_eq(va, vb),
		_ => false,
	}
}

/// A rewriter that changes nothing; useful as a traversal smoke test.
#[derive(Debug, Default)]
pub struct IdentityRewriter {
	memo: RewriteMemo,
}

impl Rewriter for IdentityRewriter {
	fn memo(&mut self) -> &mut RewriteMemo {
		&mut self.memo
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::ExprBuild;

	#[test]
	fn identity_rewrite_preserves_node_identity() {
		let shared = ExprNode::variable("v", TypeNode::int4(true));
		let tuple = ExprNode::tuple(vec![shared.clone(), shared.clone_expr()], false);
		let mut rewriter = IdentityRewriter::default();
		let result = rewriter.fold_expr(&tuple);
		assert!(Rc::ptr_eq(&result, &tuple));
	}

	#[test]
	fn memo_is_idempotent() {
		let expr = ExprNode::int4_lit(1);
		let mut rewriter = IdentityRewriter::default();
		let first = rewriter.fold_expr(&expr);
		let second = rewriter.fold_expr(&expr);
		assert!(Rc::ptr_eq(&first, &second));
	}
}
