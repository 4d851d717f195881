// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use std::fmt::Write;

use crate::diagnostic::Diagnostic;

/// Renders diagnostics as plain text for driver output.
pub struct DefaultRenderer;

impl DefaultRenderer {
	pub fn render(diagnostic: &Diagnostic) -> String {
		let mut output = String::new();

		let _ = writeln!(&mut output, "error[{}]: {}", diagnostic.code, diagnostic.message);

		if let Some(span) = &diagnostic.span {
			if !span.is_synthetic() {
				let line = span.line.0;
				let width = line.to_string().len().max(2);
				let _ = writeln!(
					&mut output,
					" {0:>width$} │ {1}",
					line,
					span.fragment,
					width = width
				);
				let _ = writeln!(
					&mut output,
					" {0:>width$} │ {1}^",
					"",
					" ".repeat(span.column.0 as usize),
					width = width
				);
			}
		}

		if let Some(label) = &diagnostic.label {
			let _ = writeln!(&mut output, " = {}", label);
		}

		if let Some(help) = &diagnostic.help {
			let _ = writeln!(&mut output, "\nhelp: {}", help);
		}

		for note in &diagnostic.notes {
			let _ = writeln!(&mut output, "\nnote: {}", note);
		}

		output
	}
}
