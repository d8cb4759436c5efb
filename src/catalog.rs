//! Minimal in-memory catalog (SPEC_FULL.md §6): enough surface for Scan and
//! SystemScan to resolve table metadata without a real CSV-to-table mapper,
//! which is out of scope here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::block_provider::BlockProvider;
use crate::schema::Schema;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("table {0} already exists")]
    DuplicateTable(String),
    #[error("cannot drop system table {0}")]
    DropSystemTable(String),
    #[error("table {0} not found")]
    MissingTable(String),
}

/// Produces a fresh `BlockProvider` for a table each time it is scanned.
pub type RowSource = Arc<dyn Fn() -> Box<dyn BlockProvider + Send> + Send + Sync>;

#[derive(Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub schema: Schema,
    pub system: bool,
    source: RowSource,
}

impl TableDescriptor {
    pub fn new(name: &str, schema: Schema, system: bool, source: RowSource) -> Self {
        TableDescriptor {
            name: name.to_string(),
            schema,
            system,
            source,
        }
    }

    pub fn open(&self) -> Box<dyn BlockProvider + Send> {
        (self.source)()
    }
}

/// Read-only during query execution (spec §5); tables are registered ahead
/// of time by the catalog's owner.
pub trait Catalog {
    fn has_table(&self, name: &str) -> bool;
    fn get_table(&self, name: &str) -> Option<&TableDescriptor>;
    fn get_tables(&self) -> Vec<&TableDescriptor>;
    fn get_system_tables(&self) -> Vec<&TableDescriptor>;
}

pub struct InMemoryCatalog {
    tables: HashMap<String, TableDescriptor>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        InMemoryCatalog {
            tables: HashMap::new(),
        }
    }

    pub fn add_table(&mut self, descriptor: TableDescriptor) -> Result<(), CatalogError> {
        if self.tables.contains_key(&descriptor.name) {
            return Err(CatalogError::DuplicateTable(descriptor.name));
        }
        self.tables.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<(), CatalogError> {
        match self.tables.get(name) {
            Some(t) if t.system => Err(CatalogError::DropSystemTable(name.to_string())),
            Some(_) => {
                self.tables.remove(name);
                Ok(())
            }
            None => Err(CatalogError::MissingTable(name.to_string())),
        }
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for InMemoryCatalog {
    fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn get_table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    fn get_tables(&self) -> Vec<&TableDescriptor> {
        self.tables.values().filter(|t| !t.system).collect()
    }

    fn get_system_tables(&self) -> Vec<&TableDescriptor> {
        self.tables.values().filter(|t| t.system).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, DEFAULT_BLOCK_CAPACITY_BYTES};
    use crate::block_provider::ProviderError;
    use crate::value::ValueKind;

    struct EmptyProvider;
    impl BlockProvider for EmptyProvider {
        fn get_next_block(&mut self) -> Result<Option<Block>, ProviderError> {
            Ok(None)
        }
    }

    #[test]
    fn duplicate_table_rejected() {
        let mut catalog = InMemoryCatalog::new();
        let schema = Schema::new(vec![crate::schema::SymbolInfo::new(
            "a",
            "t",
            ValueKind::Int,
        )]);
        let source: RowSource = Arc::new(|| Box::new(EmptyProvider));
        catalog
            .add_table(TableDescriptor::new("T", schema.clone(), false, source.clone()))
            .unwrap();
        assert!(matches!(
            catalog.add_table(TableDescriptor::new("T", schema, false, source)),
            Err(CatalogError::DuplicateTable(_))
        ));
    }

    #[test]
    fn get_tables_excludes_system_tables() {
        let mut catalog = InMemoryCatalog::new();
        let schema = Schema::new(vec![]);
        let source: RowSource = Arc::new(|| {
            Box::new(EmptyProvider) as Box<dyn BlockProvider + Send>
        });
        catalog
            .add_table(TableDescriptor::new("FRIENDS", schema.clone(), false, source.clone()))
            .unwrap();
        catalog
            .add_table(TableDescriptor::new(
                "SYSTEM_DUAL",
                schema,
                true,
                source,
            ))
            .unwrap();
        assert_eq!(catalog.get_tables().len(), 1);
        assert_eq!(catalog.get_system_tables().len(), 1);
        assert_eq!(
            DEFAULT_BLOCK_CAPACITY_BYTES > 0,
            true
        );
    }
}
