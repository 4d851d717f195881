// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::operator::{Operator, OperatorId, OperatorKind};

/// The operator DAG of one compiled query.
///
/// Operators are owned by the circuit and addressed by index. [`Circuit::push`]
/// only accepts operators whose inputs are already present, so the stored
/// order is topological by construction and cycles cannot be formed through
/// this API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
	operators: Vec<Operator>,
}

impl Circuit {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.operators.len()
	}

	pub fn is_empty(&self) -> bool {
		self.operators.is_empty()
	}

	/// Appends an operator and returns its id.
	///
	/// Panics when an input references an operator not yet added; that is a
	/// malformed producer, not a user error.
	pub fn push(&mut self, operator: Operator) -> OperatorId {
		for input in &operator.inputs {
			assert!(
				input.index() < self.operators.len(),
				"operator input {} must be added before its consumer",
				input
			);
		}
		let id = OperatorId(u32::try_from(self.operators.len())
			.unwrap_or_else(|_| panic!("circuit operator count exceeds u32")));
		self.operators.push(operator);
		id
	}

	pub fn get(&self, id: OperatorId) -> &Operator {
		&self.operators[id.index()]
	}

	/// Operators in stored (topological) order.
	pub fn iter(&self) -> impl Iterator<Item = (OperatorId, &Operator)> {
		self.operators
			.iter()
			.enumerate()
			.map(|(index, operator)| (OperatorId(index as u32), operator))
	}

	pub fn contains(&self, id: OperatorId) -> bool {
		id.index() < self.operators.len()
	}

	/// The view operator with the given name, if any.
	pub fn view(&self, name: &str) -> Option<OperatorId> {
		self.iter().find_map(|(id, operator)| match &operator.kind {
			OperatorKind::View {
				name: view_name,
			} if view_name == name => Some(id),
			_ => None,
		})
	}

	/// Identical operators in identical order; the convergence test for
	/// pass-to-fixpoint iteration.
	pub fn same_circuit(&self, other: &Circuit) -> bool {
		self.operators.len() == other.operators.len()
			&& self
				.operators
				.iter()
				.zip(&other.operators)
				.all(|(a, b)| a.same_operator(b))
	}

	/// True when no operator still carries a declarative descriptor.
	pub fn is_lowered(&self) -> bool {
		self.operators.iter().all(|operator| operator.kind.is_lowered())
	}
}

impl Display for Circuit {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		for (id, operator) in self.iter() {
			writeln!(f, "{}: {}", id, operator)?;
		}
		Ok(())
	}
}
