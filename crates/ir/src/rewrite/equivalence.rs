// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use crate::expr::{ExprKind, ExprRef, Stmt};

/// Structural comparison of two expression trees, independent of node
/// identity and alpha-equivalent for bound variables: `|a| a + 1` and
/// `|b| b + 1` are equivalent. Used for pass-convergence detection and in
/// tests; exact reference equality is a different, stricter notion.
#[derive(Debug, Default)]
pub struct EquivalenceContext {
	/// Pairs of (left name, right name) bound at the current position,
	/// innermost last.
	bindings: Vec<(String, String)>,
}

impl EquivalenceContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn equivalent(a: &ExprRef, b: &ExprRef) -> bool {
		Self::new().equivalent_expr(a, b)
	}

	pub fn equivalent_expr(&mut self, a: &ExprRef, b: &ExprRef) -> bool {
		if !a.ty.same_type(&b.ty) {
			return false;
		}
		match (&a.kind, &b.kind) {
			(ExprKind::Literal(la), ExprKind::Literal(lb)) => la == lb,
			(ExprKind::Variable(na), ExprKind::Variable(nb)) => {
				self.variables_match(na, nb)
			}
			(
				ExprKind::Field {
					source: sa,
					index: ia,
				},
				ExprKind::Field {
					source: sb,
					index: ib,
				},
			) => ia == ib && self.equivalent_expr(sa, sb),
			(
				ExprKind::Constructor {
					function: fa,
					arguments: aa,
				},
				ExprKind::Constructor {
					function: fb,
					arguments: ab,
				},
			)
			| (
				ExprKind::Apply {
					function: fa,
					arguments: aa,
				},
				ExprKind::Apply {
					function: fb,
					arguments: ab,
				},
			) => self.equivalent_expr(fa, fb) && self.equivalent_all(aa, ab),
			(
				ExprKind::Method {
					receiver: ra,
					method: ma,
					arguments: aa,
				},
				ExprKind::Method {
					receiver: rb,
					method: mb,
					arguments: ab,
				},
			) => {
				ma == mb && self.equivalent_expr(ra, rb)
					&& self.equivalent_all(aa, ab)
			}
			(
				ExprKind::Binary {
					op: oa,
					left: la,
					right: ra,
				},
				ExprKind::Binary {
					op: ob,
					left: lb,
					right: rb,
				},
			) => {
				oa == ob && self.equivalent_expr(la, lb)
					&& self.equivalent_expr(ra, rb)
			}
			(
				ExprKind::Unary {
					op: oa,
					operand: ea,
				},
				ExprKind::Unary {
					op: ob,
					operand: eb,
				},
			) => oa == ob && self.equivalent_expr(ea, eb),
			(
				ExprKind::If {
					condition: ca,
					then_branch: ta,
					else_branch: ea,
				},
				ExprKind::If {
					condition: cb,
					then_branch: tb,
					else_branch: eb,
				},
			) => {
				self.equivalent_expr(ca, cb)
					&& self.equivalent_expr(ta, tb)
					&& self.equivalent_expr(ea, eb)
			}
			(
				ExprKind::Cast {
					source: sa,
				},
				ExprKind::Cast {
					source: sb,
				},
			) => self.equivalent_expr(sa, sb),
			(
				ExprKind::Closure {
					parameters: pa,
					body: ba,
				},
				ExprKind::Closure {
					parameters: pb,
					body: bb,
				},
			) => {
				if pa.len() != pb.len() {
					return false;
				}
				if !pa.iter().zip(pb).all(|(x, y)| x.ty.same_type(&y.ty)) {
					return false;
				}
				let depth = self.bindings.len();
				for (x, y) in pa.iter().zip(pb) {
					self.bindings.push((x.name.clone(), y.name.clone()));
				}
				let result = self.equivalent_expr(ba, bb);
				self.bindings.truncate(depth);
				result
			}
			(
				ExprKind::Block {
					statements: sa,
					result: ra,
				},
				ExprKind::Block {
					statements: sb,
					result: rb,
				},
			) => {
				if sa.len() != sb.len() {
					return false;
				}
				let depth = self.bindings.len();
				let mut matched = true;
				for (x, y) in sa.iter().zip(sb) {
					match (x, y) {
						(
							Stmt::Let {
								name: na,
								value: va,
							},
							Stmt::Let {
								name: nb,
								value: vb,
							},
						) => {
							if !self.equivalent_expr(va, vb) {
								matched = false;
								break;
							}
							self.bindings
								.push((na.clone(), nb.clone()));
						}
						(Stmt::Expr(va), Stmt::Expr(vb)) => {
							if !self.equivalent_expr(va, vb) {
								matched = false;
								break;
							}
						}
						_ => {
							matched = false;
							break;
						}
					}
				}
				let result = matched && self.equivalent_expr(ra, rb);
				self.bindings.truncate(depth);
				result
			}
			(
				ExprKind::Tuple {
					elements: ea,
					raw: xa,
				},
				ExprKind::Tuple {
					elements: eb,
					raw: xb,
				},
			) => xa == xb && self.equivalent_all(ea, eb),
			(
				ExprKind::VecLiteral {
					elements: ea,
				},
				ExprKind::VecLiteral {
					elements: eb,
				},
			) => self.equivalent_all(ea, eb),
			(ExprKind::Some(sa), ExprKind::Some(sb))
			| (ExprKind::Question(sa), ExprKind::Question(sb)) => {
				self.equivalent_expr(sa, sb)
			}
			_ => false,
		}
	}

	fn equivalent_all(&mut self, a: &[ExprRef], b: &[ExprRef]) -> bool {
		a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.equivalent_expr(x, y))
	}

	/// Bound variables must be the same binding position; free variables
	/// must agree by name.
	fn variables_match(&self, a: &str, b: &str) -> bool {
		for (left, right) in self.bindings.iter().rev() {
			let left_hit = left.as_str() == a;
			let right_hit = right.as_str() == b;
			if left_hit || right_hit {
				return left_hit && right_hit;
			}
		}
		a == b
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		expr::{BinaryOp, ExprBuild, ExprNode, Parameter},
		types::TypeNode,
	};

	fn increment(parameter: &str) -> ExprRef {
		ExprNode::binary(
			BinaryOp::Add,
			ExprNode::variable(parameter, TypeNode::int4(false)),
			ExprNode::int4_lit(1),
			TypeNode::int4(false),
		)
		.closure(vec![Parameter::new(parameter, TypeNode::int4(false))])
	}

	#[test]
	fn closures_are_alpha_equivalent() {
		assert!(EquivalenceContext::equivalent(&increment("a"), &increment("b")));
	}

	#[test]
	fn free_variables_compare_by_name() {
		let a = ExprNode::variable("x", TypeNode::int4(false));
		let b = ExprNode::variable("y", TypeNode::int4(false));
		assert!(!EquivalenceContext::equivalent(&a, &b));
		assert!(EquivalenceContext::equivalent(&a, &a.deep_copy()));
	}

	#[test]
	fn bound_and_free_do_not_match() {
		// |a| x  vs  |b| b : the left body is free, the right is bound.
		let left = ExprNode::variable("x", TypeNode::int4(false))
			.closure(vec![Parameter::new("a", TypeNode::int4(false))]);
		let right = ExprNode::variable("b", TypeNode::int4(false))
			.closure(vec![Parameter::new("b", TypeNode::int4(false))]);
		assert!(!EquivalenceContext::equivalent(&left, &right));
	}

	#[test]
	fn types_participate_in_equivalence() {
		let a = ExprNode::variable("x", TypeNode::int4(false));
		let b = ExprNode::variable("x", TypeNode::int4(true));
		assert!(!EquivalenceContext::equivalent(&a, &b));
	}
}
