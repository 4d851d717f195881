// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use zetaflow_diagnostic::Span;
use zetaflow_ir::{
	AggregateSpec, EquivalenceContext, ExprRef, FlatMapSpec,
	types::TypeRef,
};

/// Index of an operator inside its owning [`Circuit`](crate::Circuit).
///
/// Ids are only meaningful within one circuit; the rewrite driver maps them
/// when a circuit is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub(crate) u32);

impl OperatorId {
	pub fn index(self) -> usize {
		self.0 as usize
	}
}

impl Display for OperatorId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "op{}", self.0)
	}
}

/// One node of the operator DAG.
///
/// Inputs are non-owning back-references into the same circuit and always
/// point at operators stored earlier, so the stored order is topological.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
	pub span: Span,
	pub kind: OperatorKind,
	pub inputs: Vec<OperatorId>,
	/// Stream value produced by this operator, a `ZSet` or `IndexedZSet`.
	pub output: TypeRef,
	pub annotations: Vec<Annotation>,
}

impl Operator {
	pub fn new(kind: OperatorKind, inputs: Vec<OperatorId>, output: TypeRef) -> Self {
		Self {
			span: Span::synthetic(),
			kind,
			inputs,
			output,
			annotations: Vec::new(),
		}
	}

	pub fn with_span(mut self, span: Span) -> Self {
		self.span = span;
		self
	}

	pub fn with_annotation(mut self, annotation: Annotation) -> Self {
		self.annotations.push(annotation);
		self
	}

	/// Rebuilds this operator with a different kind, keeping inputs, output
	/// type, span and annotations. The shape every 1:1 lowering rewrite has.
	pub fn with_kind(&self, kind: OperatorKind) -> Self {
		Self {
			span: self.span.clone(),
			kind,
			inputs: self.inputs.clone(),
			output: self.output.clone(),
			annotations: self.annotations.clone(),
		}
	}

	/// Structural comparison, independent of node identity. Annotations
	/// participate; spans do not.
	pub fn same_operator(&self, other: &Operator) -> bool {
		self.inputs == other.inputs
			&& self.output.same_type(&other.output)
			&& self.annotations == other.annotations
			&& self.kind.same_kind(&other.kind)
	}
}

/// Marks carried through lowering onto the emitted operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Annotation {
	/// The operator's output must be kept addressable by the runtime.
	Materialized,
	/// Free-form note surfaced in the generated code.
	Comment(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperatorKind {
	/// External input stream.
	Source {
		name: String,
	},
	/// Named sink, the result of one query.
	View {
		name: String,
	},
	Map {
		function: ExprRef,
	},
	/// Map producing an `IndexedZSet`; the function returns a key/value pair.
	MapIndex {
		function: ExprRef,
	},
	Filter {
		function: ExprRef,
	},
	FlatMap {
		body: FlatMapBody,
	},
	/// Aggregation of the whole stream per group key.
	StreamAggregate {
		body: AggregateBody,
	},
	Aggregate {
		body: AggregateBody,
	},
	/// A join fused with an optional post-filter and post-projection.
	/// Lowered form: `filter` and `map` folded into `function`, which then
	/// yields an optional row.
	JoinFilterMap {
		function: ExprRef,
		filter: Option<ExprRef>,
		map: Option<ExprRef>,
	},
	Noop,
	PartitionedRollingAggregate {
		partitioning: ExprRef,
		body: AggregateBody,
		lower: WindowBound,
		upper: WindowBound,
	},
	PartitionedRollingAggregateWithWatermark {
		partitioning: ExprRef,
		body: AggregateBody,
		lower: WindowBound,
		upper: WindowBound,
	},
}

impl OperatorKind {
	pub fn name(&self) -> &'static str {
		match self {
			OperatorKind::Source {
				..
			} => "source",
			OperatorKind::View {
				..
			} => "view",
			OperatorKind::Map {
				..
			} => "map",
			OperatorKind::MapIndex {
				..
			} => "map_index",
			OperatorKind::Filter {
				..
			} => "filter",
			OperatorKind::FlatMap {
				..
			} => "flat_map",
			OperatorKind::StreamAggregate {
				..
			} => "stream_aggregate",
			OperatorKind::Aggregate {
				..
			} => "aggregate",
			OperatorKind::JoinFilterMap {
				..
			} => "join_filter_map",
			OperatorKind::Noop => "noop",
			OperatorKind::PartitionedRollingAggregate {
				..
			} => "partitioned_rolling_aggregate",
			OperatorKind::PartitionedRollingAggregateWithWatermark {
				..
			} => "partitioned_rolling_aggregate_with_watermark",
		}
	}

	/// True when no declarative descriptor remains in this kind.
	pub fn is_lowered(&self) -> bool {
		match self {
			OperatorKind::FlatMap {
				body,
			} => matches!(body, FlatMapBody::Lowered(_)),
			OperatorKind::StreamAggregate {
				body,
			}
			| OperatorKind::Aggregate {
				body,
			}
			| OperatorKind::PartitionedRollingAggregate {
				body,
				..
			}
			| OperatorKind::PartitionedRollingAggregateWithWatermark {
				body,
				..
			} => matches!(body, AggregateBody::Lowered(_)),
			OperatorKind::JoinFilterMap {
				filter,
				map,
				..
			} => filter.is_none() && map.is_none(),
			OperatorKind::Noop => false,
			_ => true,
		}
	}

	fn same_kind(&self, other: &OperatorKind) -> bool {
		use OperatorKind::*;
		match (self, other) {
			(
				Source {
					name: a,
				},
				Source {
					name: b,
				},
			)
			| (
				View {
					name: a,
				},
				View {
					name: b,
				},
			) => a == b,
			(
				Map {
					function: a,
				},
				Map {
					function: b,
				},
			)
			| (
				MapIndex {
					function: a,
				},
				MapIndex {
					function: b,
				},
			)
			| (
				Filter {
					function: a,
				},
				Filter {
					function: b,
				},
			) => EquivalenceContext::equivalent(a, b),
			(
				FlatMap {
					body: a,
				},
				FlatMap {
					body: b,
				},
			) => a.equivalent(b),
			(
				StreamAggregate {
					body: a,
				},
				StreamAggregate {
					body: b,
				},
			)
			| (
				Aggregate {
					body: a,
				},
				Aggregate {
					body: b,
				},
			) => a.equivalent(b),
			(
				JoinFilterMap {
					function: fa,
					filter: la,
					map: ma,
				},
				JoinFilterMap {
					function: fb,
					filter: lb,
					map: mb,
				},
			) => {
				EquivalenceContext::equivalent(fa, fb)
					&& same_optional_expr(la, lb)
					&& same_optional_expr(ma, mb)
			}
			(Noop, Noop) => true,
			(
				PartitionedRollingAggregate {
					partitioning: pa,
					body: ba,
					lower: la,
					upper: ua,
				},
				PartitionedRollingAggregate {
					partitioning: pb,
					body: bb,
					lower: lb,
					upper: ub,
				},
			)
			| (
				PartitionedRollingAggregateWithWatermark {
					partitioning: pa,
					body: ba,
					lower: la,
					upper: ua,
				},
				PartitionedRollingAggregateWithWatermark {
					partitioning: pb,
					body: bb,
					lower: lb,
					upper: ub,
				},
			) => {
				EquivalenceContext::equivalent(pa, pb)
					&& ba.equivalent(bb) && la.equivalent(lb)
					&& ua.equivalent(ub)
			}
			_ => false,
		}
	}
}

fn same_optional_expr(a: &Option<ExprRef>, b: &Option<ExprRef>) -> bool {
	match (a, b) {
		(None, None) => true,
		(Some(a), Some(b)) => EquivalenceContext::equivalent(a, b),
		_ => false,
	}
}

/// Flat-map body: declarative before lowering, an explicit closure after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlatMapBody {
	Spec(FlatMapSpec),
	Lowered(ExprRef),
}

impl FlatMapBody {
	pub fn equivalent(&self, other: &FlatMapBody) -> bool {
		match (self, other) {
			(FlatMapBody::Spec(a), FlatMapBody::Spec(b)) => a.equivalent(b),
			(FlatMapBody::Lowered(a), FlatMapBody::Lowered(b)) => {
				EquivalenceContext::equivalent(a, b)
			}
			_ => false,
		}
	}
}

/// Aggregate body: declarative before lowering, an explicit fold after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AggregateBody {
	Spec(AggregateSpec),
	Lowered(ExprRef),
}

impl AggregateBody {
	pub fn equivalent(&self, other: &AggregateBody) -> bool {
		match (self, other) {
			(AggregateBody::Spec(a), AggregateBody::Spec(b)) => a.equivalent(b),
			(AggregateBody::Lowered(a), AggregateBody::Lowered(b)) => {
				EquivalenceContext::equivalent(a, b)
			}
			_ => false,
		}
	}
}

/// One bound of a rolling aggregation window, an offset from the current
/// row's partition position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WindowBound {
	Unbounded,
	Offset(ExprRef),
}

impl WindowBound {
	pub fn equivalent(&self, other: &WindowBound) -> bool {
		match (self, other) {
			(WindowBound::Unbounded, WindowBound::Unbounded) => true,
			(WindowBound::Offset(a), WindowBound::Offset(b)) => {
				EquivalenceContext::equivalent(a, b)
			}
			_ => false,
		}
	}
}

impl Display for Operator {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}(", self.kind.name())?;
		for (position, input) in self.inputs.iter().enumerate() {
			if position > 0 {
				write!(f, ", ")?;
			}
			write!(f, "{}", input)?;
		}
		write!(f, ") -> {}", self.output)
	}
}
