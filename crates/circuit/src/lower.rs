// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! The lowering pass: one forward sweep turning declarative operator
//! descriptors into explicit closure bodies.
//!
//! Earlier passes reason about aggregates and unnests at descriptor level;
//! this pass is the single point where row-level code is committed. Failures
//! while reducing user expressions are reported through the diagnostic
//! reporter and replaced with poison so one run surfaces every independent
//! error; the driver then refuses to hand out the partially lowered circuit.

use thiserror::Error;
use tracing::debug;
use zetaflow_diagnostic::{Diagnostic, Reporter};
use zetaflow_ir::{
	BinaryOp, ExprBuild, ExprKind, ExprNode, ExprRef, FlatMapSpec, Parameter, Stmt, TypeExt,
	reduce,
	types::TypeNode,
};

use crate::{
	circuit::Circuit,
	operator::{AggregateBody, FlatMapBody, Operator, OperatorKind},
	rewrite::{CircuitTransform, rewrite_circuit},
};

#[derive(Debug, Error)]
pub enum LowerError {
	#[error("lowering reported {count} diagnostic(s), circuit abandoned")]
	Reported {
		count: usize,
	},
}

/// Lowers every descriptor-carrying operator of `circuit`.
///
/// Either every operator comes out fully lowered, or at least one diagnostic
/// was reported and no circuit is returned.
pub fn lower(circuit: &Circuit, reporter: &mut dyn Reporter) -> Result<Circuit, LowerError> {
	let errors_before = reporter.error_count();
	let lowered = rewrite_circuit(
		circuit,
		&mut LowerCircuit {
			reporter: &mut *reporter,
		},
	);
	let count = reporter.error_count() - errors_before;
	if count > 0 {
		return Err(LowerError::Reported {
			count,
		});
	}
	debug_assert!(lowered.is_lowered());
	Ok(lowered)
}

struct LowerCircuit<'a> {
	reporter: &'a mut dyn Reporter,
}

impl CircuitTransform for LowerCircuit<'_> {
	fn rewrite(&mut self, operator: &Operator) -> Operator {
		let kind = match &operator.kind {
			OperatorKind::FlatMap {
				body: FlatMapBody::Spec(spec),
			} => OperatorKind::FlatMap {
				body: FlatMapBody::Lowered(rewrite_flatmap(spec, self.reporter)),
			},
			OperatorKind::StreamAggregate {
				body: AggregateBody::Spec(spec),
			} => OperatorKind::StreamAggregate {
				body: AggregateBody::Lowered(spec.as_fold(self.reporter)),
			},
			OperatorKind::Aggregate {
				body: AggregateBody::Spec(spec),
			} => OperatorKind::Aggregate {
				body: AggregateBody::Lowered(spec.as_fold(self.reporter)),
			},
			OperatorKind::JoinFilterMap {
				function,
				filter: Some(filter),
				map,
			} => OperatorKind::JoinFilterMap {
				function: lower_join_filter_map(
					function,
					filter,
					map.as_ref(),
					self.reporter,
				),
				filter: None,
				map: None,
			},
			OperatorKind::Noop => lower_noop(operator),
			OperatorKind::PartitionedRollingAggregate {
				partitioning,
				body: AggregateBody::Spec(spec),
				lower,
				upper,
			} => OperatorKind::PartitionedRollingAggregate {
				partitioning: partitioning.clone(),
				body: AggregateBody::Lowered(spec.as_fold(self.reporter)),
				lower: lower.clone(),
				upper: upper.clone(),
			},
			OperatorKind::PartitionedRollingAggregateWithWatermark {
				partitioning,
				body: AggregateBody::Spec(spec),
				lower,
				upper,
			} => OperatorKind::PartitionedRollingAggregateWithWatermark {
				partitioning: partitioning.clone(),
				body: AggregateBody::Lowered(spec.as_fold(self.reporter)),
				lower: lower.clone(),
				upper: upper.clone(),
			},
			// Operators without a descriptor, aggregate kinds included,
			// are already in lowered form.
			_ => return operator.clone(),
		};
		debug!(operator = operator.kind.name(), "lowered descriptor");
		operator.with_kind(kind)
	}
}

/// Expands an unnest descriptor into an explicit closure over the input row.
///
/// Shape of the produced body:
///
/// ```text
/// |row| {
///     let col0 = row.0.clone();            // one per pass-through column
///     let data = if row-collection is null { vec![] } else { ... };
///     data.into_iter().enumerate().map(|e| (col0.clone(), ..., e))
/// }
/// ```
///
/// `enumerate` appears only when ordinality was requested; the position is
/// emitted 1-based, cast to the requested ordinality type.
pub fn rewrite_flatmap(spec: &FlatMapSpec, reporter: &mut dyn Reporter) -> ExprRef {
	let row_fields = spec
		.input_row_type
		.tuple_fields()
		.unwrap_or_else(|| panic!("flat-map input row must be tuple shaped, found {}", spec.input_row_type));
	let row = ExprNode::variable("row", spec.input_row_type.clone());

	let mut statements = Vec::new();
	for &index in &spec.pass_through {
		assert!(index < row_fields.len(), "pass-through column {} out of range", index);
		statements.push(Stmt::let_binding(
			format!("col{index}"),
			row.field(index).clone_expr(),
		));
	}

	// A null collection unnests to zero rows, not to a null row.
	let collection = reduce(&spec.collection.call(vec![row.clone()]), reporter);
	let data_type = TypeNode::array(spec.element_type.clone(), false);
	let data = if collection.ty.nullable {
		ExprNode::if_then(
			collection.is_null(),
			ExprNode::vec_literal(vec![], data_type.clone()),
			collection.unwrap(),
		)
	} else {
		collection
	};
	statements.push(Stmt::let_binding("data", data));
	let data_var = ExprNode::variable("data", data_type);

	// With ordinality the element arrives as an (index, element) pair.
	let inner_param_type = match &spec.ordinality_type {
		Some(_) => TypeNode::raw_tuple(vec![TypeNode::usize(), spec.element_type.clone()]),
		None => spec.element_type.clone(),
	};
	let entry = ExprNode::variable("e", inner_param_type.clone());
	let element = match &spec.ordinality_type {
		Some(_) => entry.field(1),
		None => entry.clone(),
	};

	let mut columns: Vec<ExprRef> = Vec::new();
	for &index in &spec.pass_through {
		let local = ExprNode::variable(format!("col{index}"), row_fields[index].clone());
		columns.push(local.clone_expr());
	}
	match &spec.projections {
		Some(projections) => {
			for projection in projections {
				columns.push(reduce(&projection.call(vec![element.clone()]), reporter));
			}
		}
		None if spec.emit_element => {
			// A composite element contributes its fields as separate
			// output columns.
			match spec.element_type.tuple_fields() {
				Some(fields) => {
					for index in 0..fields.len() {
						columns.push(element.field(index).clone_expr());
					}
				}
				None => columns.push(element.clone_expr()),
			}
		}
		None => {}
	}
	if let Some(ordinality_type) = &spec.ordinality_type {
		let position = ExprNode::binary(
			BinaryOp::Add,
			entry.field(0),
			ExprNode::usize_lit(1),
			TypeNode::usize(),
		);
		columns.push(position.cast(ordinality_type.clone()));
	}

	let Some(columns) = spec.shuffle.apply(&columns) else {
		reporter.report(
			Diagnostic::new("LOWER_002", "shuffle index out of range")
				.with_span(spec.input_row_type.span.clone())
				.with_label(format!(
					"the unnest produces {} output columns",
					columns.len()
				)),
		);
		return ExprNode::poison(spec.input_row_type.span.clone(), TypeNode::any());
	};

	let inner = ExprNode::tuple(columns, false)
		.closure(vec![Parameter::new("e", inner_param_type)]);

	let mut iterator = data_var.method("into_iter", TypeNode::any(), vec![]);
	if spec.ordinality_type.is_some() {
		iterator = iterator.method("enumerate", TypeNode::any(), vec![]);
	}
	let mapped = iterator.method("map", TypeNode::any(), vec![inner]);

	ExprNode::block(statements, mapped)
		.closure(vec![Parameter::new("row", spec.input_row_type.clone())])
}

/// Folds a join's post-filter (and optional post-projection) into its body,
/// producing a closure that yields an optional row: `None` stands for a
/// filtered-out match, so downstream operators treat all rows uniformly.
fn lower_join_filter_map(
	function: &ExprRef,
	filter: &ExprRef,
	map: Option<&ExprRef>,
	reporter: &mut dyn Reporter,
) -> ExprRef {
	let ExprKind::Closure {
		parameters,
		body,
	} = &function.kind
	else {
		panic!("join body must be a closure, found {}", function);
	};
	let new_body = match map {
		None => {
			// let tmp = join-row; if filter(tmp) { Some(tmp) } else { None }
			let tmp = ExprNode::variable("tmp", body.ty.clone());
			let condition = reduce(&filter.call(vec![tmp.clone()]), reporter);
			ExprNode::block(
				vec![Stmt::let_binding("tmp", body.clone())],
				ExprNode::if_then(
					condition,
					tmp.some(),
					ExprNode::none(&body.ty.with_nullable(true)),
				),
			)
		}
		Some(map) => {
			// Filter and projection each see the raw join row.
			let condition = reduce(&filter.call(vec![body.clone()]), reporter);
			let value = reduce(&map.call(vec![body.clone()]), reporter);
			let none = ExprNode::none(&value.ty.with_nullable(true));
			ExprNode::if_then(condition, value.some(), none)
		}
	};
	new_body.closure(parameters.clone())
}

/// No-ops never survive lowering; the output type picks the identity
/// replacement.
fn lower_noop(operator: &Operator) -> OperatorKind {
	if operator.output.is_zset() {
		let element = operator.output.zset_element().clone();
		let row = ExprNode::variable("row", element.clone());
		OperatorKind::Map {
			function: row.clone_expr().closure(vec![Parameter::new("row", element)]),
		}
	} else if operator.output.is_indexed_zset() {
		let (key, value) = operator.output.indexed_zset_parts();
		let entry_type = TypeNode::raw_tuple(vec![key.clone(), value.clone()]);
		let entry = ExprNode::variable("kv", entry_type.clone());
		let pair = ExprNode::tuple(
			vec![entry.field(0).clone_expr(), entry.field(1).clone_expr()],
			true,
		);
		OperatorKind::MapIndex {
			function: pair.closure(vec![Parameter::new("kv", entry_type)]),
		}
	} else {
		panic!("no-op output must be a zset or indexed zset, found {}", operator.output);
	}
}

#[cfg(test)]
mod tests {
	use zetaflow_diagnostic::DiagnosticSink;
	use zetaflow_ir::{AggregateSpec, FoldSpec, Literal, Shuffle, types::TypeRef};

	use super::*;

	fn row_type() -> TypeRef {
		// (a: i32, b: array of i32)
		TypeNode::tuple(
			vec![
				TypeNode::int4(false),
				TypeNode::array(TypeNode::int4(false), false),
			],
			false,
		)
	}

	fn unnest_spec(ordinality: Option<TypeRef>) -> FlatMapSpec {
		let row = row_type();
		let collection = ExprNode::variable("x", row.clone())
			.field(1)
			.closure(vec![Parameter::new("x", row.clone())]);
		FlatMapSpec {
			input_row_type: row,
			collection,
			pass_through: vec![0],
			projections: None,
			emit_element: true,
			element_type: TypeNode::int4(false),
			ordinality_type: ordinality,
			shuffle: Shuffle::Identity,
		}
	}

	#[test]
	fn flatmap_lowering_builds_the_map_chain() {
		let mut sink = DiagnosticSink::new();
		let lowered = rewrite_flatmap(&unnest_spec(None), &mut sink);
		assert!(!sink.has_errors());

		let ExprKind::Closure {
			parameters,
			body,
		} = &lowered.kind
		else {
			panic!("expected the outer closure");
		};
		assert_eq!(parameters.len(), 1);
		let ExprKind::Block {
			statements,
			result,
		} = &body.kind
		else {
			panic!("expected a block body");
		};
		// one pass-through local plus the collection binding
		assert_eq!(statements.len(), 2);
		let ExprKind::Method {
			receiver,
			method,
			arguments,
		} = &result.kind
		else {
			panic!("expected the map call");
		};
		assert_eq!(method, "map");
		assert_eq!(arguments.len(), 1);
		let ExprKind::Method {
			method: iterate,
			..
		} = &receiver.kind
		else {
			panic!("expected the iterator call");
		};
		assert_eq!(iterate, "into_iter");
	}

	#[test]
	fn ordinality_enumerates_and_shifts_to_one_based() {
		let mut sink = DiagnosticSink::new();
		let lowered =
			rewrite_flatmap(&unnest_spec(Some(TypeNode::int8(false))), &mut sink);
		assert!(!sink.has_errors());

		let ExprKind::Closure {
			body,
			..
		} = &lowered.kind
		else {
			panic!("expected the outer closure");
		};
		let ExprKind::Block {
			result,
			..
		} = &body.kind
		else {
			panic!("expected a block body");
		};
		let ExprKind::Method {
			receiver,
			arguments,
			..
		} = &result.kind
		else {
			panic!("expected the map call");
		};
		let ExprKind::Method {
			method: enumerate,
			..
		} = &receiver.kind
		else {
			panic!("expected the enumerate call");
		};
		assert_eq!(enumerate, "enumerate");

		// inner closure output: (pass-through, element, position + 1 as i64)
		let ExprKind::Closure {
			body: inner_body,
			..
		} = &arguments[0].kind
		else {
			panic!("expected the inner closure");
		};
		let ExprKind::Tuple {
			elements,
			..
		} = &inner_body.kind
		else {
			panic!("expected the output row tuple");
		};
		assert_eq!(elements.len(), 3);
		let ExprKind::Cast {
			source,
		} = &elements[2].kind
		else {
			panic!("expected the ordinality cast");
		};
		assert!(elements[2].ty.same_type(&TypeNode::int8(false)));
		let ExprKind::Binary {
			op: BinaryOp::Add,
			right,
			..
		} = &source.kind
		else {
			panic!("expected position + 1");
		};
		assert!(matches!(&right.kind, ExprKind::Literal(Literal::USize(1))));
	}

	#[test]
	fn nullable_collection_unnests_to_empty() {
		let row = TypeNode::tuple(
			vec![TypeNode::array(TypeNode::int4(false), true)],
			false,
		);
		let collection = ExprNode::variable("x", row.clone())
			.field(0)
			.closure(vec![Parameter::new("x", row.clone())]);
		let spec = FlatMapSpec {
			input_row_type: row,
			collection,
			pass_through: vec![],
			projections: None,
			emit_element: true,
			element_type: TypeNode::int4(false),
			ordinality_type: None,
			shuffle: Shuffle::Identity,
		};
		let mut sink = DiagnosticSink::new();
		let lowered = rewrite_flatmap(&spec, &mut sink);
		assert!(!sink.has_errors());

		let ExprKind::Closure {
			body,
			..
		} = &lowered.kind
		else {
			panic!("expected the outer closure");
		};
		let ExprKind::Block {
			statements,
			..
		} = &body.kind
		else {
			panic!("expected a block body");
		};
		let Stmt::Let {
			value,
			..
		} = &statements[0]
		else {
			panic!("expected the collection binding");
		};
		let ExprKind::If {
			condition,
			then_branch,
			..
		} = &value.kind
		else {
			panic!("expected the null guard");
		};
		assert!(matches!(
			&condition.kind,
			ExprKind::Unary {
				op: zetaflow_ir::UnaryOp::IsNull,
				..
			}
		));
		assert!(matches!(
			&then_branch.kind,
			ExprKind::VecLiteral { elements } if elements.is_empty()
		));
	}

	#[test]
	fn out_of_range_shuffle_reports_and_poisons() {
		let mut spec = unnest_spec(None);
		spec.shuffle = Shuffle::Explicit(vec![0, 9]);
		let mut sink = DiagnosticSink::new();
		let lowered = rewrite_flatmap(&spec, &mut sink);
		assert_eq!(sink.error_count(), 1);
		assert!(matches!(lowered.kind, ExprKind::Literal(Literal::Poison)));
	}

	fn join_function() -> ExprRef {
		// |k, l, r| (l.0.clone(), r.0.clone())
		let key = Parameter::new("k", TypeNode::int4(false));
		let left_ty = TypeNode::tuple(vec![TypeNode::int4(false)], false);
		let right_ty = TypeNode::tuple(vec![TypeNode::utf8(false)], false);
		let left = ExprNode::variable("l", left_ty.clone());
		let right = ExprNode::variable("r", right_ty.clone());
		ExprNode::tuple(
			vec![left.field(0).clone_expr(), right.field(0).clone_expr()],
			false,
		)
		.closure(vec![
			key,
			Parameter::new("l", left_ty),
			Parameter::new("r", right_ty),
		])
	}

	fn true_filter(row_ty: &TypeRef) -> ExprRef {
		ExprNode::bool_lit(true).closure(vec![Parameter::new("t", row_ty.clone())])
	}

	#[test]
	fn join_with_filter_only_binds_tmp() {
		let function = join_function();
		let ExprKind::Closure {
			body,
			..
		} = &function.kind
		else {
			unreachable!();
		};
		let row_ty = body.ty.clone();
		let mut sink = DiagnosticSink::new();
		let lowered =
			lower_join_filter_map(&function, &true_filter(&row_ty), None, &mut sink);
		assert!(!sink.has_errors());

		let ExprKind::Closure {
			parameters,
			body,
		} = &lowered.kind
		else {
			panic!("expected a closure");
		};
		assert_eq!(parameters.len(), 3);
		let ExprKind::Block {
			statements,
			result,
		} = &body.kind
		else {
			panic!("expected the let tmp block");
		};
		assert!(matches!(
			&statements[0],
			Stmt::Let { name, .. } if name == "tmp"
		));
		let ExprKind::If {
			then_branch,
			else_branch,
			..
		} = &result.kind
		else {
			panic!("expected the filter conditional");
		};
		assert!(matches!(&then_branch.kind, ExprKind::Some(_)));
		assert!(matches!(&else_branch.kind, ExprKind::Literal(Literal::None)));
		assert!(then_branch.ty.nullable);
	}

	#[test]
	fn join_with_filter_and_projection_maps_the_row() {
		let function = join_function();
		let ExprKind::Closure {
			body,
			..
		} = &function.kind
		else {
			unreachable!();
		};
		let row_ty = body.ty.clone();
		let projection = ExprNode::variable("t", row_ty.clone())
			.field(0)
			.closure(vec![Parameter::new("t", row_ty.clone())]);
		let mut sink = DiagnosticSink::new();
		let lowered = lower_join_filter_map(
			&function,
			&true_filter(&row_ty),
			Some(&projection),
			&mut sink,
		);
		assert!(!sink.has_errors());

		let ExprKind::Closure {
			body,
			..
		} = &lowered.kind
		else {
			panic!("expected a closure");
		};
		let ExprKind::If {
			then_branch,
			..
		} = &body.kind
		else {
			panic!("expected the filter conditional");
		};
		let ExprKind::Some(value) = &then_branch.kind else {
			panic!("expected the projected row wrapped in Some");
		};
		assert!(value.ty.same_type(&TypeNode::int4(false)));
	}

	#[test]
	fn noop_over_zset_lowers_to_identity_map() {
		let operator = Operator::new(
			OperatorKind::Noop,
			vec![],
			TypeNode::zset(TypeNode::int4(false)),
		);
		assert!(matches!(
			lower_noop(&operator),
			OperatorKind::Map {
				..
			}
		));
	}

	#[test]
	fn noop_over_indexed_zset_lowers_to_identity_map_index() {
		let operator = Operator::new(
			OperatorKind::Noop,
			vec![],
			TypeNode::indexed_zset(TypeNode::int4(false), TypeNode::utf8(false)),
		);
		assert!(matches!(
			lower_noop(&operator),
			OperatorKind::MapIndex {
				..
			}
		));
	}

	fn count_aggregate(row_type: &TypeRef) -> AggregateSpec {
		let step = ExprNode::binary(
			BinaryOp::Add,
			ExprNode::variable("a", TypeNode::int8(false)),
			ExprNode::variable("w", TypeNode::int8(false)),
			TypeNode::int8(false),
		)
		.closure(vec![
			Parameter::new("a", TypeNode::int8(false)),
			Parameter::new("r", row_type.clone()),
			Parameter::new("w", TypeNode::int8(false)),
		]);
		let finish = ExprNode::variable("a", TypeNode::int8(false))
			.closure(vec![Parameter::new("a", TypeNode::int8(false))]);
		AggregateSpec::new(
			row_type.clone(),
			vec![FoldSpec {
				init: ExprNode::int8_lit(0),
				step,
				finish,
			}],
		)
	}

	#[test]
	fn lowering_preserves_operator_count_and_clears_descriptors() {
		let row = row_type();
		let mut circuit = Circuit::new();
		let source = circuit.push(Operator::new(
			OperatorKind::Source {
				name: "t".into(),
			},
			vec![],
			TypeNode::zset(row.clone()),
		));
		let unnest = circuit.push(Operator::new(
			OperatorKind::FlatMap {
				body: FlatMapBody::Spec(unnest_spec(None)),
			},
			vec![source],
			TypeNode::zset(TypeNode::tuple(
				vec![TypeNode::int4(false), TypeNode::int4(false)],
				false,
			)),
		));
		let aggregate = circuit.push(Operator::new(
			OperatorKind::Aggregate {
				body: AggregateBody::Spec(count_aggregate(&row)),
			},
			vec![unnest],
			TypeNode::zset(TypeNode::int8(false)),
		));
		let noop = circuit.push(Operator::new(
			OperatorKind::Noop,
			vec![aggregate],
			TypeNode::zset(TypeNode::int8(false)),
		));
		circuit.push(Operator::new(
			OperatorKind::View {
				name: "v".into(),
			},
			vec![noop],
			TypeNode::zset(TypeNode::int8(false)),
		));

		let mut sink = DiagnosticSink::new();
		let lowered = lower(&circuit, &mut sink).unwrap();
		assert_eq!(lowered.len(), circuit.len());
		assert!(lowered.is_lowered());
		assert_eq!(lowered.view("v"), circuit.view("v"));
	}

	#[test]
	fn already_lowered_aggregates_pass_through() {
		let fold = ExprNode::variable("ordering", TypeNode::any());
		let mut circuit = Circuit::new();
		circuit.push(Operator::new(
			OperatorKind::Aggregate {
				body: AggregateBody::Lowered(fold),
			},
			vec![],
			TypeNode::zset(TypeNode::int8(false)),
		));
		let mut sink = DiagnosticSink::new();
		let lowered = lower(&circuit, &mut sink).unwrap();
		assert!(lowered.same_circuit(&circuit));
	}

	#[test]
	fn failed_lowering_reports_and_returns_err() {
		let mut spec = unnest_spec(None);
		spec.shuffle = Shuffle::Explicit(vec![7]);
		let mut circuit = Circuit::new();
		let source = circuit.push(Operator::new(
			OperatorKind::Source {
				name: "t".into(),
			},
			vec![],
			TypeNode::zset(row_type()),
		));
		circuit.push(Operator::new(
			OperatorKind::FlatMap {
				body: FlatMapBody::Spec(spec),
			},
			vec![source],
			TypeNode::zset(TypeNode::int4(false)),
		));
		let mut sink = DiagnosticSink::new();
		let result = lower(&circuit, &mut sink);
		assert!(matches!(
			result,
			Err(LowerError::Reported {
				count: 1
			})
		));
	}
}
