// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use std::collections::{HashMap, HashSet};

use zetaflow_diagnostic::{Diagnostic, Reporter};

use super::{RewriteMemo, Rewriter};
use crate::expr::{ExprKind, ExprNode, ExprRef, Parameter, Stmt};

/// Reduces a closure application to its substituted body.
///
/// Lowering builds calls like `step(acc.0, row, weight)` where `step` is a
/// closure taken from a descriptor; the generated operator body must not
/// contain the application itself, only the inlined result. An application
/// whose callee is not a closure cannot be inlined: that is reported as a
/// user-facing error and a poison expression of the expected type is
/// returned so the remaining operators still get checked.
pub fn reduce(expr: &ExprRef, reporter: &mut dyn Reporter) -> ExprRef {
	let ExprKind::Apply {
		function,
		arguments,
	} = &expr.kind
	else {
		return expr.clone();
	};
	let ExprKind::Closure {
		parameters,
		body,
	} = &function.kind
	else {
		reporter.report(
			Diagnostic::new("LOWER_001", "expression does not reduce to a value")
				.with_span(expr.span.clone())
				.with_label("this call cannot be inlined")
				.with_help("the callee must be a closure literal at lowering time"),
		);
		return ExprNode::poison(expr.span.clone(), expr.ty.clone());
	};
	if parameters.len() != arguments.len() {
		reporter.report(
			Diagnostic::new("LOWER_001", "expression does not reduce to a value")
				.with_span(expr.span.clone())
				.with_label(format!(
					"closure over {} parameters called with {} arguments",
					parameters.len(),
					arguments.len()
				)),
		);
		return ExprNode::poison(expr.span.clone(), expr.ty.clone());
	}
	let bindings: HashMap<String, ExprRef> = parameters
		.iter()
		.zip(arguments)
		.map(|(parameter, argument)| (parameter.name.clone(), argument.clone()))
		.collect();
	SubstituteVariables::new(bindings).fold_expr(body)
}

/// Capture-avoiding substitution of variables by expressions.
///
/// Inner closures and let bindings that reuse a substituted name shadow it;
/// the shadowed subtree is rewritten under the narrowed environment. A
/// binder whose name occurs free in a replacement value is renamed before
/// the substitution descends, so the replacement keeps referring to the
/// enclosing scope instead of being captured by the binder.
#[derive(Debug)]
pub struct SubstituteVariables {
	memo: RewriteMemo,
	bindings: HashMap<String, ExprRef>,
	/// Names occurring free in the replacement values.
	free_in_values: HashSet<String>,
}

impl SubstituteVariables {
	pub fn new(bindings: HashMap<String, ExprRef>) -> Self {
		let mut free_in_values = HashSet::new();
		for value in bindings.values() {
			collect_free(value, &mut Vec::new(), &mut free_in_values);
		}
		Self {
			memo: RewriteMemo::new(),
			bindings,
			free_in_values,
		}
	}

	fn narrowed(&self, shadowed: impl Iterator<Item = String>) -> HashMap<String, ExprRef> {
		let mut bindings = self.bindings.clone();
		for name in shadowed {
			bindings.remove(&name);
		}
		bindings
	}
}

/// Collects the variables of `expr` not bound by an enclosing closure
/// parameter or let statement within `expr` itself.
fn collect_free(expr: &ExprRef, bound: &mut Vec<String>, free: &mut HashSet<String>) {
	match &expr.kind {
		ExprKind::Literal(_) => {}
		ExprKind::Variable(name) => {
			if !bound.iter().any(|binder| binder == name) {
				free.insert(name.clone());
			}
		}
		ExprKind::Field {
			source, ..
		}
		| ExprKind::Cast {
			source,
		} => collect_free(source, bound, free),
		ExprKind::Some(source) | ExprKind::Question(source) => {
			collect_free(source, bound, free)
		}
		ExprKind::Unary {
			operand, ..
		} => collect_free(operand, bound, free),
		ExprKind::Constructor {
			function,
			arguments,
		}
		| ExprKind::Apply {
			function,
			arguments,
		} => {
			collect_free(function, bound, free);
			for argument in arguments {
				collect_free(argument, bound, free);
			}
		}
		ExprKind::Method {
			receiver,
			arguments,
			..
		} => {
			collect_free(receiver, bound, free);
			for argument in arguments {
				collect_free(argument, bound, free);
			}
		}
		ExprKind::Binary {
			left,
			right,
			..
		} => {
			collect_free(left, bound, free);
			collect_free(right, bound, free);
		}
		ExprKind::If {
			condition,
			then_branch,
			else_branch,
		} => {
			collect_free(condition, bound, free);
			collect_free(then_branch, bound, free);
			collect_free(else_branch, bound, free);
		}
		ExprKind::Tuple {
			elements, ..
		}
		| ExprKind::VecLiteral {
			elements,
		} => {
			for element in elements {
				collect_free(element, bound, free);
			}
		}
		ExprKind::Closure {
			parameters,
			body,
		} => {
			let depth = bound.len();
			bound.extend(parameters.iter().map(|parameter| parameter.name.clone()));
			collect_free(body, bound, free);
			bound.truncate(depth);
		}
		ExprKind::Block {
			statements,
			result,
		} => {
			let depth = bound.len();
			for statement in statements {
				match statement {
					Stmt::Let {
						name,
						value,
					} => {
						collect_free(value, bound, free);
						bound.push(name.clone());
					}
					Stmt::Expr(value) => collect_free(value, bound, free),
				}
			}
			collect_free(result, bound, free);
			bound.truncate(depth);
		}
	}
}

fn fresh_name(base: &str, avoid: &HashSet<String>) -> String {
	let mut counter = 0u32;
	loop {
		let candidate = format!("{base}_{counter}");
		if !avoid.contains(&candidate) {
			return candidate;
		}
		counter += 1;
	}
}

impl Rewriter for SubstituteVariables {
	fn memo(&mut self) -> &mut RewriteMemo {
		&mut self.memo
	}

	fn rewrite_expr(&mut self, expr: &ExprRef) -> ExprRef {
		match &expr.kind {
			ExprKind::Variable(name) => match self.bindings.get(name) {
				Some(replacement) => replacement.clone(),
				None => expr.clone(),
			},
			ExprKind::Closure {
				parameters,
				body,
			} if parameters.iter().any(|p| {
				self.bindings.contains_key(&p.name)
					|| self.free_in_values.contains(&p.name)
			}) =>
			{
				let narrowed =
					self.narrowed(parameters.iter().map(|p| p.name.clone()));
				if narrowed.is_empty() {
					return expr.clone();
				}
				let mut avoid = self.free_in_values.clone();
				collect_free(body, &mut Vec::new(), &mut avoid);
				for parameter in parameters {
					avoid.insert(parameter.name.clone());
				}
				let mut renames: HashMap<String, ExprRef> = HashMap::new();
				let parameters: Vec<Parameter> = parameters
					.iter()
					.map(|parameter| {
						if !self.free_in_values.contains(&parameter.name) {
							return parameter.clone();
						}
						let fresh = fresh_name(&parameter.name, &avoid);
						avoid.insert(fresh.clone());
						renames.insert(
							parameter.name.clone(),
							ExprNode::variable(
								fresh.clone(),
								parameter.ty.clone(),
							),
						);
						Parameter::new(fresh, parameter.ty.clone())
					})
					.collect();
				// The memo is keyed by node identity only, so a subtree
				// rewritten under a narrowed environment gets its own
				// substitution state.
				let body = if renames.is_empty() {
					body.clone()
				} else {
					SubstituteVariables::new(renames).fold_expr(body)
				};
				let body = SubstituteVariables::new(narrowed).fold_expr(&body);
				ExprNode::new(
					ExprKind::Closure {
						parameters,
						body,
					},
					self.fold_type(&expr.ty),
					expr.span.clone(),
				)
			}
			ExprKind::Block {
				statements,
				result,
			} if statements.iter().any(|statement| {
				matches!(
					statement,
					Stmt::Let { name, .. } if self.bindings.contains_key(name)
						|| self.free_in_values.contains(name)
				)
			}) =>
			{
				let mut avoid = self.free_in_values.clone();
				collect_free(expr, &mut Vec::new(), &mut avoid);
				for statement in statements {
					if let Stmt::Let {
						name, ..
					} = statement
					{
						avoid.insert(name.clone());
					}
				}
				// Each let value sees the environment before its own
				// binding takes effect.
				let mut bindings = self.bindings.clone();
				let mut new_statements = Vec::with_capacity(statements.len());
				for statement in statements {
					match statement {
						Stmt::Let {
							name,
							value,
						} => {
							let value = SubstituteVariables::new(
								bindings.clone(),
							)
							.fold_expr(value);
							if self.free_in_values.contains(name) {
								let fresh =
									fresh_name(name, &avoid);
								avoid.insert(fresh.clone());
								bindings.insert(
									name.clone(),
									ExprNode::variable(
										fresh.clone(),
										value.ty.clone(),
									),
								);
								new_statements.push(Stmt::Let {
									name: fresh,
									value,
								});
							} else {
								bindings.remove(name);
								new_statements.push(Stmt::Let {
									name: name.clone(),
									value,
								});
							}
						}
						Stmt::Expr(value) => {
							let value = SubstituteVariables::new(
								bindings.clone(),
							)
							.fold_expr(value);
							new_statements.push(Stmt::Expr(value));
						}
					}
				}
				let result = SubstituteVariables::new(bindings).fold_expr(result);
				ExprNode::new(
					ExprKind::Block {
						statements: new_statements,
						result,
					},
					self.fold_type(&expr.ty),
					expr.span.clone(),
				)
			}
			_ => self.walk_expr(expr),
		}
	}
}
