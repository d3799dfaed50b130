//! file: core/src/vm/globals.rs
//! description: per-context tables: globals, statics and class state.
//!
//! None of this is shared between execution contexts. Launched tasks start
//! with empty tables and see only the frozen registry.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::value::{Value, VarRef};

/// The global symbol table. Top-level compiled variables alias these cells.
#[derive(Debug, Default)]
pub struct Globals {
    vars: IndexMap<String, VarRef>,
}

impl Globals {
    /// Cell for `name`, created undefined on first use.
    pub fn entry(&mut self, name: &str) -> VarRef {
        self.vars.entry(name.to_string()).or_insert_with(VarRef::undefined).clone()
    }

    /// Point `name` at an existing cell (`global $x`, `$x = &$y` at top level).
    pub fn bind(&mut self, name: &str, cell: VarRef) {
        self.vars.insert(name.to_string(), cell);
    }

    pub fn lookup(&self, name: &str) -> Option<VarRef> {
        self.vars.get(name).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).and_then(VarRef::get)
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.shift_remove(name);
    }

    /// Defined, user-visible globals in declaration order.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.vars
            .iter()
            .filter(|(name, _)| !name.starts_with('\0'))
            .filter_map(|(name, cell)| cell.get().map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }
}

/// Function statics, static properties and lazily evaluated class values.
#[derive(Debug, Default)]
pub struct ClassState {
    /// `static $x` cells keyed by (function identity, slot).
    pub statics: HashMap<(usize, u32), VarRef>,
    /// Static property cells keyed by (declaring class, property).
    pub static_props: HashMap<(String, String), VarRef>,
    /// Evaluated class constants keyed by (declaring class, constant).
    pub class_constants: HashMap<(String, String), Value>,
    /// Constants created with `define()` or `const` at run time.
    pub constants: HashMap<String, Value>,
    /// Evaluated instance property defaults per class.
    pub prop_defaults: HashMap<String, IndexMap<String, Option<Value>>>,
}

impl ClassState {
    pub fn clear(&mut self) {
        self.statics.clear();
        self.static_props.clear();
        self.class_constants.clear();
        self.constants.clear();
        self.prop_defaults.clear();
    }
}
