// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! The operator graph of the Zetaflow compiler backend and the passes that
//! run over it: the dependency-ordered rewrite framework and the lowering
//! pass that turns declarative operator descriptors into explicit closure
//! bodies ready for code emission.

pub mod circuit;
pub mod encoding;
pub mod lower;
pub mod operator;
pub mod rewrite;

pub use circuit::Circuit;
pub use lower::{LowerError, lower, rewrite_flatmap};
pub use operator::{
	AggregateBody, Annotation, FlatMapBody, Operator, OperatorId, OperatorKind, WindowBound,
};
pub use rewrite::{CircuitTransform, RewriteBodies, rewrite_circuit};
