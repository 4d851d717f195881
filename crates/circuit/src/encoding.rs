// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! Compact binary persistence for whole circuits, sharing the IR's
//! encoding contract: decoding yields a structurally equivalent circuit,
//! node identity is not preserved.

use zetaflow_ir::encoding::EncodingError;

use crate::circuit::Circuit;

pub fn encode_circuit(circuit: &Circuit) -> Result<Vec<u8>, EncodingError> {
	postcard::to_allocvec(circuit).map_err(EncodingError::Encode)
}

pub fn decode_circuit(bytes: &[u8]) -> Result<Circuit, EncodingError> {
	postcard::from_bytes(bytes).map_err(EncodingError::Decode)
}

#[cfg(test)]
mod tests {
	use zetaflow_ir::{
		AggregateSpec, ExprBuild, ExprNode, FoldSpec, Parameter, Shuffle,
		types::TypeNode,
	};

	use super::*;
	use crate::operator::{
		AggregateBody, Annotation, FlatMapBody, Operator, OperatorKind, WindowBound,
	};

	#[test]
	fn circuits_round_trip_structurally() {
		let row = TypeNode::tuple(
			vec![TypeNode::array(TypeNode::int4(false), false)],
			false,
		);
		let collection = ExprNode::variable("x", row.clone())
			.field(0)
			.closure(vec![Parameter::new("x", row.clone())]);
		let mut circuit = Circuit::new();
		let source = circuit.push(Operator::new(
			OperatorKind::Source {
				name: "t".into(),
			},
			vec![],
			TypeNode::zset(row.clone()),
		));
		circuit.push(Operator::new(
			OperatorKind::FlatMap {
				body: FlatMapBody::Spec(zetaflow_ir::FlatMapSpec {
					input_row_type: row,
					collection,
					pass_through: vec![],
					projections: None,
					emit_element: true,
					element_type: TypeNode::int4(false),
					ordinality_type: None,
					shuffle: Shuffle::Identity,
				}),
			},
			vec![source],
			TypeNode::zset(TypeNode::int4(false)),
		));

		let decoded = decode_circuit(&encode_circuit(&circuit).unwrap()).unwrap();
		assert!(decoded.same_circuit(&circuit));
	}

	#[test]
	fn every_operator_kind_round_trips() {
		let row = TypeNode::tuple(vec![TypeNode::int4(false)], false);
		let zset = TypeNode::zset(row.clone());
		let indexed = TypeNode::indexed_zset(TypeNode::int4(false), row.clone());
		let identity = ExprNode::variable("row", row.clone())
			.closure(vec![Parameter::new("row", row.clone())]);
		let predicate = ExprNode::bool_lit(true)
			.closure(vec![Parameter::new("row", row.clone())]);
		let key_value = ExprNode::tuple(
			vec![
				ExprNode::variable("row", row.clone()).field(0),
				ExprNode::variable("row", row.clone()),
			],
			true,
		)
		.closure(vec![Parameter::new("row", row.clone())]);
		let accumulator = TypeNode::int8(false);
		let spec = AggregateSpec::new(
			row.clone(),
			vec![FoldSpec {
				init: ExprNode::int8_lit(0),
				step: ExprNode::variable("a", accumulator.clone()).closure(vec![
					Parameter::new("a", accumulator.clone()),
					Parameter::new("r", row.clone()),
					Parameter::new("w", TypeNode::int8(false)),
				]),
				finish: ExprNode::variable("a", accumulator.clone())
					.closure(vec![Parameter::new("a", accumulator.clone())]),
			}],
		);
		let join_function = ExprNode::variable("l", row.clone()).closure(vec![
			Parameter::new("k", TypeNode::int4(false)),
			Parameter::new("l", row.clone()),
			Parameter::new("r", row.clone()),
		]);

		let mut circuit = Circuit::new();
		let source = circuit.push(Operator::new(
			OperatorKind::Source {
				name: "t".into(),
			},
			vec![],
			zset.clone(),
		));
		let map = circuit.push(
			Operator::new(
				OperatorKind::Map {
					function: identity.clone(),
				},
				vec![source],
				zset.clone(),
			)
			.with_annotation(Annotation::Materialized)
			.with_annotation(Annotation::Comment("projection".into())),
		);
		let index = circuit.push(Operator::new(
			OperatorKind::MapIndex {
				function: key_value,
			},
			vec![map],
			indexed.clone(),
		));
		circuit.push(Operator::new(
			OperatorKind::Filter {
				function: predicate.clone(),
			},
			vec![map],
			zset.clone(),
		));
		circuit.push(Operator::new(
			OperatorKind::FlatMap {
				body: FlatMapBody::Lowered(identity.clone()),
			},
			vec![map],
			zset.clone(),
		));
		circuit.push(Operator::new(
			OperatorKind::StreamAggregate {
				body: AggregateBody::Spec(spec.clone()),
			},
			vec![index],
			indexed.clone(),
		));
		circuit.push(Operator::new(
			OperatorKind::Aggregate {
				body: AggregateBody::Lowered(identity.clone()),
			},
			vec![index],
			indexed.clone(),
		));
		circuit.push(Operator::new(
			OperatorKind::JoinFilterMap {
				function: join_function,
				filter: Some(predicate),
				map: Some(identity.clone()),
			},
			vec![index, index],
			zset.clone(),
		));
		circuit.push(Operator::new(OperatorKind::Noop, vec![map], zset.clone()));
		circuit.push(Operator::new(
			OperatorKind::PartitionedRollingAggregate {
				partitioning: identity.clone(),
				body: AggregateBody::Spec(spec),
				lower: WindowBound::Unbounded,
				upper: WindowBound::Offset(ExprNode::int8_lit(0)),
			},
			vec![index],
			indexed.clone(),
		));
		circuit.push(Operator::new(
			OperatorKind::PartitionedRollingAggregateWithWatermark {
				partitioning: identity,
				body: AggregateBody::Lowered(ExprNode::int8_lit(0)),
				lower: WindowBound::Offset(ExprNode::int8_lit(-10)),
				upper: WindowBound::Offset(ExprNode::int8_lit(10)),
			},
			vec![index],
			indexed,
		));
		circuit.push(Operator::new(
			OperatorKind::View {
				name: "v".into(),
			},
			vec![map],
			zset,
		));

		let decoded = decode_circuit(&encode_circuit(&circuit).unwrap()).unwrap();
		assert!(decoded.same_circuit(&circuit));
	}

	#[test]
	fn truncated_input_is_a_decode_error() {
		let mut circuit = Circuit::new();
		circuit.push(Operator::new(
			OperatorKind::Source {
				name: "t".into(),
			},
			vec![],
			TypeNode::zset(TypeNode::int4(false)),
		));
		let bytes = encode_circuit(&circuit).unwrap();
		assert!(matches!(
			decode_circuit(&bytes[..bytes.len() / 2]),
			Err(EncodingError::Decode(_))
		));
	}
}
