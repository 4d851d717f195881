// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! The typed intermediate representation of the Zetaflow compiler backend.
//!
//! Operator bodies are DAGs of immutable, `Rc`-shared expression and type
//! nodes. Rewriting never mutates a node; passes produce new nodes through
//! the [`rewrite`] framework, which guarantees that a node reachable from
//! several parents is replaced by exactly one new node.

pub mod encoding;
pub mod expr;
pub mod passes;
pub mod rewrite;
pub mod types;

pub use expr::{
	AggregateSpec, BinaryOp, ExprBuild, ExprKind, ExprNode, ExprRef, FlatMapSpec, FoldSpec,
	Literal, Parameter, Shuffle, Stmt, UnaryOp,
};
pub use rewrite::{EquivalenceContext, RewriteMemo, Rewriter, reduce};
pub use types::{
	StructField, StructRegistry, StructType, TypeExt, TypeKind, TypeNode, TypeRef,
};
