// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use serde::{Deserialize, Serialize};
use zetaflow_diagnostic::{Diagnostic, Reporter, Span};

use super::{ExprBuild, ExprKind, ExprNode, ExprRef, Parameter};
use crate::{
	rewrite::{EquivalenceContext, reduce},
	types::{TypeNode, TypeRef},
};

/// Declarative description of an aggregation, one [`FoldSpec`] per
/// aggregate call in the query.
///
/// Optimization passes reason about aggregates in this form; the lowering
/// pass commits it to an explicit fold expression via [`AggregateSpec::as_fold`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSpec {
	/// Type of the input rows all step closures receive.
	pub row_type: TypeRef,
	pub components: Vec<FoldSpec>,
}

/// One aggregate as an (initial value, step, finish) triple.
///
/// `step` is a closure over (accumulator, row, weight), where the weight is
/// the signed multiplicity of the row in the input Z-set; `finish` is a
/// closure over the accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldSpec {
	pub init: ExprRef,
	pub step: ExprRef,
	pub finish: ExprRef,
}

impl AggregateSpec {
	pub fn new(row_type: TypeRef, components: Vec<FoldSpec>) -> Self {
		assert!(!components.is_empty(), "aggregate requires at least one component");
		Self {
			row_type,
			components,
		}
	}

	/// Expands the descriptor into an explicit fold constructor call.
	///
	/// Malformed step or finish expressions are user-facing errors; a
	/// poison expression is returned so remaining operators still get
	/// checked, and the driver fails the compilation afterwards.
	pub fn as_fold(&self, reporter: &mut dyn Reporter) -> ExprRef {
		for component in &self.components {
			if !is_closure_with_arity(&component.step, 3) {
				return self.malformed(reporter, "aggregate step must be a closure over (accumulator, row, weight)");
			}
			if !is_closure_with_arity(&component.finish, 1) {
				return self.malformed(reporter, "aggregate finish must be a closure over the accumulator");
			}
		}

		if let [only] = self.components.as_slice() {
			return fold_constructor(
				only.init.clone(),
				only.step.clone(),
				only.finish.clone(),
			);
		}

		// Several aggregates fold together over one tuple accumulator.
		let accumulator_type = TypeNode::raw_tuple(
			self.components.iter().map(|c| c.init.ty.clone()).collect(),
		);
		let accumulator = ExprNode::variable("a", accumulator_type.clone());
		let row = ExprNode::variable("r", self.row_type.clone());
		let weight = ExprNode::variable("w", TypeNode::int8(false));

		let init = ExprNode::tuple(
			self.components.iter().map(|c| c.init.clone()).collect(),
			true,
		);

		let step_body = ExprNode::tuple(
			self.components
				.iter()
				.enumerate()
				.map(|(index, component)| {
					reduce(
						&component.step.call(vec![
							accumulator.field(index),
							row.clone(),
							weight.clone(),
						]),
						reporter,
					)
				})
				.collect(),
			true,
		);
		let step = step_body.closure(vec![
			Parameter::new("a", accumulator_type.clone()),
			Parameter::new("r", self.row_type.clone()),
			Parameter::new("w", TypeNode::int8(false)),
		]);

		let finish_body = ExprNode::tuple(
			self.components
				.iter()
				.enumerate()
				.map(|(index, component)| {
					reduce(
						&component.finish.call(vec![accumulator.field(index)]),
						reporter,
					)
				})
				.collect(),
			true,
		);
		let finish = finish_body.closure(vec![Parameter::new("a", accumulator_type)]);

		fold_constructor(init, step, finish)
	}

	fn malformed(&self, reporter: &mut dyn Reporter, message: &str) -> ExprRef {
		reporter.report(
			Diagnostic::new("LOWER_003", message)
				.with_span(self.row_type.span.clone())
				.with_help("the aggregate descriptor was produced malformed by an earlier pass"),
		);
		ExprNode::poison(Span::synthetic(), TypeNode::any())
	}

	/// Structural equivalence, independent of node identity.
	pub fn equivalent(&self, other: &AggregateSpec) -> bool {
		self.row_type.same_type(&other.row_type)
			&& self.components.len() == other.components.len()
			&& self.components.iter().zip(&other.components).all(|(a, b)| {
				EquivalenceContext::equivalent(&a.init, &b.init)
					&& EquivalenceContext::equivalent(&a.step, &b.step)
					&& EquivalenceContext::equivalent(&a.finish, &b.finish)
			})
	}
}

fn is_closure_with_arity(expr: &ExprRef, arity: usize) -> bool {
	matches!(
		&expr.kind,
		ExprKind::Closure {
			parameters,
			..
		} if parameters.len() == arity
	)
}

fn fold_constructor(init: ExprRef, step: ExprRef, finish: ExprRef) -> ExprRef {
	let function = ExprNode::variable("Fold::with_output", TypeNode::any());
	ExprNode::constructor(function, TypeNode::any(), vec![init, step, finish])
}
