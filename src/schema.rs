//! `Schema`: an ordered list of named, typed columns attached to every
//! operator's output, per spec §3.

use crate::value::ValueKind;
use std::fmt;

/// Describes one output column of an operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    /// Bare column name, e.g. `"a"`.
    pub name: String,
    /// Name qualified by source table, e.g. `"t.a"`.
    pub qualified_name: String,
    pub kind: ValueKind,
    /// Name of the table this column was scanned from, if any (constant
    /// rows and computed columns carry an empty string).
    pub source_table: String,
}

impl SymbolInfo {
    pub fn new(name: impl Into<String>, source_table: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        let source_table = source_table.into();
        let qualified_name = if source_table.is_empty() {
            name.clone()
        } else {
            format!("{source_table}.{name}")
        };
        SymbolInfo {
            name,
            qualified_name,
            kind,
            source_table,
        }
    }

    pub fn matches(&self, identifier: &str) -> bool {
        self.name == identifier || self.qualified_name == identifier
    }
}

impl fmt::Display for SymbolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.qualified_name, self.kind)
    }
}

/// Ordered, named, typed column list. Join/cross operators concatenate
/// lhs and rhs schemas; projection remaps and renames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub columns: Vec<SymbolInfo>,
}

impl Schema {
    pub fn new(columns: Vec<SymbolInfo>) -> Self {
        Schema { columns }
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn find(&self, identifier: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.matches(identifier))
    }

    /// Concatenates two schemas, used by cross/inner/hash joins (spec §4.9,
    /// §4.10): lhs columns first, then rhs columns.
    pub fn concat(lhs: &Schema, rhs: &Schema) -> Schema {
        let mut columns = lhs.columns.clone();
        columns.extend(rhs.columns.iter().cloned());
        Schema::new(columns)
    }
}
