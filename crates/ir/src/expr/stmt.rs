// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::ExprRef;

/// Statements inside a block expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
	Let {
		name: String,
		value: ExprRef,
	},
	Expr(ExprRef),
}

impl Stmt {
	pub fn let_binding(name: impl Into<String>, value: ExprRef) -> Self {
		Self::Let {
			name: name.into(),
			value,
		}
	}
}

impl Display for Stmt {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Stmt::Let {
				name,
				value,
			} => write!(f, "let {} = {};", name, value),
			Stmt::Expr(value) => write!(f, "{};", value),
		}
	}
}
