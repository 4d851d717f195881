// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use crate::diagnostic::Diagnostic;

/// Sink for user-facing errors discovered during compilation.
///
/// Passes report through this interface and keep going with poison
/// expressions where they can, so one run surfaces as many independent
/// errors as possible. The driver checks [`Reporter::error_count`] after
/// each pass and abandons the compilation if it grew.
pub trait Reporter {
	fn report(&mut self, diagnostic: Diagnostic);

	fn error_count(&self) -> usize;

	fn has_errors(&self) -> bool {
		self.error_count() > 0
	}
}

/// The default collecting reporter.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
	diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn diagnostics(&self) -> &[Diagnostic] {
		&self.diagnostics
	}

	pub fn into_diagnostics(self) -> Vec<Diagnostic> {
		self.diagnostics
	}
}

impl Reporter for DiagnosticSink {
	fn report(&mut self, diagnostic: Diagnostic) {
		self.diagnostics.push(diagnostic);
	}

	fn error_count(&self) -> usize {
		self.diagnostics.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sink_collects_in_order() {
		let mut sink = DiagnosticSink::new();
		assert!(!sink.has_errors());
		sink.report(Diagnostic::new("LOWER_001", "first"));
		sink.report(Diagnostic::new("LOWER_002", "second"));
		assert_eq!(sink.error_count(), 2);
		assert_eq!(sink.diagnostics()[0].code, "LOWER_001");
		assert_eq!(sink.diagnostics()[1].code, "LOWER_002");
	}
}
