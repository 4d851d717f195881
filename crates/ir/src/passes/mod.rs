// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

//! Whole-program type normalization passes.

mod eliminate_structs;
mod specialize_binary;

pub use eliminate_structs::EliminateStructs;
pub use specialize_binary::SpecializeBinary;
