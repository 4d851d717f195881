// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Zetaflow

use indexmap::IndexMap;

use super::StructType;

/// Deterministic generator for sanitized struct identifiers.
#[derive(Debug)]
pub struct NameGen {
	prefix: &'static str,
	next: usize,
}

impl NameGen {
	pub fn new(prefix: &'static str) -> Self {
		Self {
			prefix,
			next: 0,
		}
	}

	pub fn next_name(&mut self) -> String {
		let name = format!("{}{}", self.prefix, self.next);
		self.next += 1;
		name
	}
}

/// Per-compilation registry of user-declared struct types.
///
/// Populated by the front end while declarations are discovered, read-only
/// once lowering begins. One instance per compilation run; never shared
/// across compilations.
#[derive(Debug)]
pub struct StructRegistry {
	name_gen: NameGen,
	declarations: IndexMap<String, StructType>,
}

impl Default for StructRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl StructRegistry {
	pub fn new() -> Self {
		Self {
			name_gen: NameGen::new("struct_"),
			declarations: IndexMap::new(),
		}
	}

	/// Sanitized name for a qualified struct name.
	///
	/// When the struct is not registered yet a fresh name is generated;
	/// the caller is expected to register the struct under it shortly.
	pub fn sanitized_name(&mut self, name: &str) -> String {
		if let Some(declaration) = self.declarations.get(name) {
			return declaration.sanitized_name.clone();
		}
		self.name_gen.next_name()
	}

	pub fn register(&mut self, declaration: StructType) {
		let previous = self.declarations.insert(declaration.name.clone(), declaration);
		assert!(previous.is_none(), "struct registered twice");
	}

	pub fn get(&self, name: &str) -> Option<&StructType> {
		self.declarations.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.declarations.contains_key(name)
	}
}
