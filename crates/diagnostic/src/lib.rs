// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! Source spans, user-facing diagnostics and the reporter interface shared
//! by all compilation passes.

mod diagnostic;
mod render;
mod reporter;
mod span;

pub use diagnostic::Diagnostic;
pub use render::DefaultRenderer;
pub use reporter::{DiagnosticSink, Reporter};
pub use span::{Span, SpanColumn, SpanLine};
