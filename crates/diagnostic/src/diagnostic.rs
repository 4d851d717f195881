// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// A user-facing compilation error with source attribution.
///
/// Diagnostics describe problems in the query being compiled; bugs in the
/// compiler itself are contract violations and panic instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
	pub code: String,
	pub message: String,
	pub span: Option<Span>,
	pub label: Option<String>,
	pub help: Option<String>,
	pub notes: Vec<String>,
}

impl Diagnostic {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			message: message.into(),
			span: None,
			label: None,
			help: None,
			notes: Vec::new(),
		}
	}

	pub fn with_span(mut self, span: Span) -> Self {
		self.span = Some(span);
		self
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	pub fn with_help(mut self, help: impl Into<String>) -> Self {
		self.help = Some(help.into());
		self
	}

	pub fn with_note(mut self, note: impl Into<String>) -> Self {
		self.notes.push(note.into());
		self
	}
}

impl Display for Diagnostic {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "error[{}]: {}", self.code, self.message)
	}
}
