// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! Dependency-ordered rebuilding of a circuit.
//!
//! The driver walks operators in stored order, hands each transform an
//! operator whose inputs are already remapped into the new circuit, and
//! inserts exactly one replacement per original. Cardinality is 1:1 by
//! contract; a transform changes an operator's kind or body, never the
//! shape of the DAG.

use std::collections::HashMap;

use tracing::trace;
use zetaflow_ir::{
	AggregateSpec, ExprRef, FlatMapSpec, FoldSpec, Rewriter,
	types::TypeRef,
};

use crate::{
	circuit::Circuit,
	operator::{AggregateBody, FlatMapBody, Operator, OperatorId, OperatorKind, WindowBound},
};

pub trait CircuitTransform {
	/// Produces the replacement for one operator. `operator` already has
	/// its inputs remapped into the circuit under construction.
	fn rewrite(&mut self, operator: &Operator) -> Operator {
		operator.clone()
	}
}

pub fn rewrite_circuit<T: CircuitTransform>(circuit: &Circuit, transform: &mut T) -> Circuit {
	let mut result = Circuit::new();
	let mut mapped: HashMap<OperatorId, OperatorId> = HashMap::new();
	for (id, operator) in circuit.iter() {
		let inputs = operator
			.inputs
			.iter()
			.map(|input| mapped[input])
			.collect();
		let remapped = Operator {
			inputs,
			..operator.clone()
		};
		let replacement = transform.rewrite(&remapped);
		trace!(operator = %id, from = remapped.kind.name(), to = replacement.kind.name(), "rewrote operator");
		let new_id = result.push(replacement);
		mapped.insert(id, new_id);
	}
	assert_eq!(
		result.len(),
		circuit.len(),
		"circuit rewrite must preserve operator cardinality"
	);
	result
}

/// Applies an expression/type rewriter to every operator body and output
/// type of a circuit. How the type specialization passes run at circuit
/// scope.
pub struct RewriteBodies<'a, R: Rewriter> {
	pub rewriter: &'a mut R,
}

impl<'a, R: Rewriter> RewriteBodies<'a, R> {
	pub fn new(rewriter: &'a mut R) -> Self {
		Self {
			rewriter,
		}
	}

	fn fold_optional(&mut self, expr: &Option<ExprRef>) -> Option<ExprRef> {
		expr.as_ref().map(|expr| self.rewriter.fold_expr(expr))
	}

	fn fold_flatmap_body(&mut self, body: &FlatMapBody) -> FlatMapBody {
		match body {
			FlatMapBody::Spec(spec) => FlatMapBody::Spec(self.fold_flatmap_spec(spec)),
			FlatMapBody::Lowered(function) => {
				FlatMapBody::Lowered(self.rewriter.fold_expr(function))
			}
		}
	}

	fn fold_flatmap_spec(&mut self, spec: &FlatMapSpec) -> FlatMapSpec {
		FlatMapSpec {
			input_row_type: self.rewriter.fold_type(&spec.input_row_type),
			collection: self.rewriter.fold_expr(&spec.collection),
			pass_through: spec.pass_through.clone(),
			projections: spec.projections.as_ref().map(|projections| {
				projections
					.iter()
					.map(|projection| self.rewriter.fold_expr(projection))
					.collect()
			}),
			emit_element: spec.emit_element,
			element_type: self.rewriter.fold_type(&spec.element_type),
			ordinality_type: spec
				.ordinality_type
				.as_ref()
				.map(|ty| self.rewriter.fold_type(ty)),
			shuffle: spec.shuffle.clone(),
		}
	}

	fn fold_aggregate_body(&mut self, body: &AggregateBody) -> AggregateBody {
		match body {
			AggregateBody::Spec(spec) => {
				AggregateBody::Spec(AggregateSpec {
					row_type: self.rewriter.fold_type(&spec.row_type),
					components: spec
						.components
						.iter()
						.map(|component| FoldSpec {
							init: self.rewriter.fold_expr(&component.init),
							step: self.rewriter.fold_expr(&component.step),
							finish: self
								.rewriter
								.fold_expr(&component.finish),
						})
						.collect(),
				})
			}
			AggregateBody::Lowered(fold) => {
				AggregateBody::Lowered(self.rewriter.fold_expr(fold))
			}
		}
	}

	fn fold_bound(&mut self, bound: &WindowBound) -> WindowBound {
		match bound {
			WindowBound::Unbounded => WindowBound::Unbounded,
			WindowBound::Offset(offset) => {
				WindowBound::Offset(self.rewriter.fold_expr(offset))
			}
		}
	}

	fn fold_output(&mut self, output: &TypeRef) -> TypeRef {
		self.rewriter.fold_type(output)
	}
}

impl<R: Rewriter> CircuitTransform for RewriteBodies<'_, R> {
	fn rewrite(&mut self, operator: &Operator) -> Operator {
		let kind = match &operator.kind {
			OperatorKind::Source {
				name,
			} => OperatorKind::Source {
				name: name.clone(),
			},
			OperatorKind::View {
				name,
			} => OperatorKind::View {
				name: name.clone(),
			},
			OperatorKind::Map {
				function,
			} => OperatorKind::Map {
				function: self.rewriter.fold_expr(function),
			},
			OperatorKind::MapIndex {
				function,
			} => OperatorKind::MapIndex {
				function: self.rewriter.fold_expr(function),
			},
			OperatorKind::Filter {
				function,
			} => OperatorKind::Filter {
				function: self.rewriter.fold_expr(function),
			},
			OperatorKind::FlatMap {
				body,
			} => OperatorKind::FlatMap {
				body: self.fold_flatmap_body(body),
			},
			OperatorKind::StreamAggregate {
				body,
			} => OperatorKind::StreamAggregate {
				body: self.fold_aggregate_body(body),
			},
			OperatorKind::Aggregate {
				body,
			} => OperatorKind::Aggregate {
				body: self.fold_aggregate_body(body),
			},
			OperatorKind::JoinFilterMap {
				function,
				filter,
				map,
			} => OperatorKind::JoinFilterMap {
				function: self.rewriter.fold_expr(function),
				filter: self.fold_optional(filter),
				map: self.fold_optional(map),
			},
			OperatorKind::Noop => OperatorKind::Noop,
			OperatorKind::PartitionedRollingAggregate {
				partitioning,
				body,
				lower,
				upper,
			} => OperatorKind::PartitionedRollingAggregate {
				partitioning: self.rewriter.fold_expr(partitioning),
				body: self.fold_aggregate_body(body),
				lower: self.fold_bound(lower),
				upper: self.fold_bound(upper),
			},
			OperatorKind::PartitionedRollingAggregateWithWatermark {
				partitioning,
				body,
				lower,
				upper,
			} => OperatorKind::PartitionedRollingAggregateWithWatermark {
				partitioning: self.rewriter.fold_expr(partitioning),
				body: self.fold_aggregate_body(body),
				lower: self.fold_bound(lower),
				upper: self.fold_bound(upper),
			},
		};
		Operator {
			span: operator.span.clone(),
			kind,
			inputs: operator.inputs.clone(),
			output: self.fold_output(&operator.output),
			annotations: operator.annotations.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use zetaflow_ir::{
		ExprBuild, ExprNode, Parameter, TypeExt,
		passes::EliminateStructs,
		types::{StructField, StructType, TypeKind, TypeNode},
	};

	use super::*;

	#[test]
	fn default_transform_clones_the_circuit() {
		struct Passthrough;
		impl CircuitTransform for Passthrough {}

		let mut circuit = Circuit::new();
		let source = circuit.push(Operator::new(
			OperatorKind::Source {
				name: "t".into(),
			},
			vec![],
			TypeNode::zset(TypeNode::int4(false)),
		));
		circuit.push(Operator::new(
			OperatorKind::Noop,
			vec![source],
			TypeNode::zset(TypeNode::int4(false)),
		));

		let rewritten = rewrite_circuit(&circuit, &mut Passthrough);
		assert!(rewritten.same_circuit(&circuit));
	}

	#[test]
	fn body_rewrite_reaches_functions_and_output_types() {
		let person = TypeNode::new(
			TypeKind::Struct(StructType {
				name: "PERSON".into(),
				sanitized_name: "struct_0".into(),
				fields: vec![StructField {
					name: "age".into(),
					ty: TypeNode::int4(false),
				}],
			}),
			false,
			zetaflow_diagnostic::Span::synthetic(),
		);
		let function = ExprNode::variable("row", person.clone())
			.clone_expr()
			.closure(vec![Parameter::new("row", person.clone())]);

		let mut circuit = Circuit::new();
		let source = circuit.push(Operator::new(
			OperatorKind::Source {
				name: "person".into(),
			},
			vec![],
			TypeNode::zset(person.clone()),
		));
		circuit.push(Operator::new(
			OperatorKind::Map {
				function,
			},
			vec![source],
			TypeNode::zset(person),
		));

		let mut pass = EliminateStructs::new();
		let rewritten =
			rewrite_circuit(&circuit, &mut RewriteBodies::new(&mut pass));

		for (_, operator) in rewritten.iter() {
			assert!(!matches!(
				operator.output.zset_element().kind,
				TypeKind::Struct(_)
			));
		}
	}
}
