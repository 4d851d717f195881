// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! Compact binary persistence for IR fragments.
//!
//! Encoding flattens the `Rc` DAG into a tree: a node shared by several
//! parents is written once per occurrence, and decoding yields structurally
//! equivalent but identity-distinct nodes. All consumers compare persisted
//! fragments structurally, so sharing is a memory optimization that does not
//! survive a round trip, by contract.

use std::rc::Rc;

use thiserror::Error;

use crate::{
	expr::{ExprNode, ExprRef},
	types::{TypeNode, TypeRef},
};

#[derive(Debug, Error)]
pub enum EncodingError {
	#[error("failed to encode IR fragment: {0}")]
	Encode(#[source] postcard::Error),
	#[error("failed to decode IR fragment: {0}")]
	Decode(#[source] postcard::Error),
}

pub fn encode_type(ty: &TypeRef) -> Result<Vec<u8>, EncodingError> {
	postcard::to_allocvec(&**ty).map_err(EncodingError::Encode)
}

pub fn decode_type(bytes: &[u8]) -> Result<TypeRef, EncodingError> {
	postcard::from_bytes::<TypeNode>(bytes)
		.map(Rc::new)
		.map_err(EncodingError::Decode)
}

pub fn encode_expr(expr: &ExprRef) -> Result<Vec<u8>, EncodingError> {
	postcard::to_allocvec(&**expr).map_err(EncodingError::Encode)
}

pub fn decode_expr(bytes: &[u8]) -> Result<ExprRef, EncodingError> {
	postcard::from_bytes::<ExprNode>(bytes)
		.map(Rc::new)
		.map_err(EncodingError::Decode)
}
