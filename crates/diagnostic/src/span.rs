// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use std::{
	cmp::Ordering,
	fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

/// Location of an IR node in the original query text.
///
/// Nodes synthesized during lowering carry a [`Span::synthetic`] span; the
/// span never influences equality of types or structural equivalence of
/// expressions, it is attribution only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
	/// Line number, starting at 1. Synthetic spans use line 0.
	pub line: SpanLine,
	/// Column offset within the line, starting at 0.
	pub column: SpanColumn,
	/// The query text this node was compiled from.
	pub fragment: String,
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanLine(pub u32);

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanColumn(pub u32);

impl Span {
	pub fn new(line: u32, column: u32, fragment: impl Into<String>) -> Self {
		Self {
			line: SpanLine(line),
			column: SpanColumn(column),
			fragment: fragment.into(),
		}
	}

	/// Span for nodes the compiler invents itself.
	pub fn synthetic() -> Self {
		Self {
			line: SpanLine(0),
			column: SpanColumn(0),
			fragment: String::new(),
		}
	}

	pub fn is_synthetic(&self) -> bool {
		self.line.0 == 0
	}

	pub fn testing(fragment: impl Into<String>) -> Self {
		Self {
			line: SpanLine(1),
			column: SpanColumn(0),
			fragment: fragment.into(),
		}
	}
}

impl Display for Span {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self.fragment, f)
	}
}

impl AsRef<str> for Span {
	fn as_ref(&self) -> &str {
		self.fragment.as_str()
	}
}

impl PartialOrd for Span {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Span {
	fn cmp(&self, other: &Self) -> Ordering {
		self.line.cmp(&other.line).then(self.column.cmp(&other.column))
	}
}
