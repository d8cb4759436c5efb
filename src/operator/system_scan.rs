//! `SystemTableScanOperatorNode` (spec §4.6): materialises a built-in
//! catalog view into a single block, then streams it like any other scan.

use std::sync::{Arc, Mutex};

use crate::block::{Block, BlockManager, DEFAULT_BLOCK_CAPACITY_BYTES};
use crate::block_iterator::{BlockIterator, Row};
use crate::block_provider::VecBlockProvider;
use crate::catalog::Catalog;
use crate::function_registry::FunctionRegistry;
use crate::schema::{Schema, SymbolInfo};
use crate::value::ValueKind;

use super::{ConnectError, Operator, OperatorError, OperatorState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTableKind {
    Dual,
    Tables,
    Columns,
    Functions,
    Parameters,
    Mappings,
}

impl SystemTableKind {
    pub fn name(&self) -> &'static str {
        match self {
            SystemTableKind::Dual => "SYSTEM_DUAL",
            SystemTableKind::Tables => "SYSTEM_TABLES",
            SystemTableKind::Columns => "SYSTEM_COLUMNS",
            SystemTableKind::Functions => "SYSTEM_FUNCTIONS",
            SystemTableKind::Parameters => "SYSTEM_PARAMETERS",
            SystemTableKind::Mappings => "SYSTEM_MAPPINGS",
        }
    }

    pub fn schema(&self) -> Schema {
        let col = |name: &str, kind: ValueKind| SymbolInfo::new(name, self.name(), kind);
        match self {
            SystemTableKind::Dual => Schema::new(vec![col("dummy", ValueKind::String)]),
            SystemTableKind::Tables => Schema::new(vec![
                col("name", ValueKind::String),
                col("system", ValueKind::Bool),
            ]),
            SystemTableKind::Columns => Schema::new(vec![
                col("table_name", ValueKind::String),
                col("column_name", ValueKind::String),
                col("type", ValueKind::String),
            ]),
            SystemTableKind::Functions => Schema::new(vec![
                col("name", ValueKind::String),
                col("arity", ValueKind::Int),
            ]),
            SystemTableKind::Parameters => Schema::new(vec![
                col("name", ValueKind::String),
                col("position", ValueKind::Int),
            ]),
            SystemTableKind::Mappings => Schema::new(vec![
                col("table_name", ValueKind::String),
                col("file_path", ValueKind::String),
            ]),
        }
    }
}

fn materialize(kind: SystemTableKind, catalog: &dyn Catalog, functions: &FunctionRegistry) -> Block {
    let mut block = Block::new(DEFAULT_BLOCK_CAPACITY_BYTES);
    match kind {
        SystemTableKind::Dual => {
            block.add_string("X", false);
            block.next_row();
        }
        SystemTableKind::Tables => {
            let mut tables = catalog.get_tables();
            tables.extend(catalog.get_system_tables());
            for table in tables {
                block.add_string(&table.name, false);
                block.add_bool(table.system, false);
                block.next_row();
            }
        }
        SystemTableKind::Columns => {
            let mut tables = catalog.get_tables();
            tables.extend(catalog.get_system_tables());
            for table in tables {
                for column in &table.schema.columns {
                    block.add_string(&table.name, false);
                    block.add_string(&column.name, false);
                    block.add_string(&column.kind.to_string(), false);
                    block.next_row();
                }
            }
        }
        SystemTableKind::Functions => {
            for (name, arity) in functions.registered() {
                block.add_string(&name, false);
                block.add_int(arity as i64, false);
                block.next_row();
            }
        }
        SystemTableKind::Parameters | SystemTableKind::Mappings => {}
    }
    block.end_blocks();
    block
}

pub struct SystemScanOperator {
    kind: SystemTableKind,
    schema: Schema,
    iterator: BlockIterator,
    row: Row,
    state: OperatorState,
}

impl SystemScanOperator {
    pub fn new(
        kind: SystemTableKind,
        catalog: &dyn Catalog,
        functions: &FunctionRegistry,
        manager: Arc<Mutex<BlockManager>>,
    ) -> Self {
        let block = materialize(kind, catalog, functions);
        let provider = Box::new(VecBlockProvider::new(vec![block]));
        SystemScanOperator {
            schema: kind.schema(),
            kind,
            iterator: BlockIterator::new(provider, manager),
            row: Row::new(),
            state: OperatorState::Connected,
        }
    }
}

impl Operator for SystemScanOperator {
    fn connect(&mut self, _input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        Err(ConnectError::TooManyInputs)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        if self.state == OperatorState::Drained {
            return Ok(None);
        }
        self.state = OperatorState::Producing;
        match self.iterator.get_next_row()? {
            Some(row) => {
                self.row = row.clone();
                Ok(Some(&self.row))
            }
            None => {
                self.state = OperatorState::Drained;
                Ok(None)
            }
        }
    }

    fn column_infos(&self) -> &Schema {
        &self.schema
    }

    fn dump(&self, out: &mut String) {
        out.push_str(&format!("SystemTableScanOperator({})", self.kind.name()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, RowSource, TableDescriptor};
    use crate::block::Block as B;
    use crate::block_provider::{BlockProvider, ProviderError};
    use crate::value::Value;
    use std::sync::Arc as StdArc;

    struct EmptyProvider;
    impl BlockProvider for EmptyProvider {
        fn get_next_block(&mut self) -> Result<Option<B>, ProviderError> {
            Ok(None)
        }
    }

    #[test]
    fn system_tables_row_count_matches_scenario() {
        let mut catalog = InMemoryCatalog::new();
        let source: RowSource = StdArc::new(|| Box::new(EmptyProvider));
        catalog
            .add_table(TableDescriptor::new(
                "FRIENDS",
                Schema::new(vec![SymbolInfo::new("id", "FRIENDS", ValueKind::Int)]),
                false,
                source.clone(),
            ))
            .unwrap();
        for name in [
            "SYSTEM_DUAL",
            "SYSTEM_TABLES",
            "SYSTEM_COLUMNS",
            "SYSTEM_FUNCTIONS",
            "SYSTEM_PARAMETERS",
        ] {
            catalog
                .add_table(TableDescriptor::new(name, Schema::new(vec![]), true, source.clone()))
                .unwrap();
        }
        let functions = FunctionRegistry::new();
        let manager = Arc::new(Mutex::new(BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES)));
        let mut op = SystemScanOperator::new(SystemTableKind::Tables, &catalog, &functions, manager);
        let mut count = 0;
        let mut friends_system = None;
        while let Some(row) = op.get_next_row().unwrap() {
            if row[0] == Value::String("FRIENDS".to_string()) {
                friends_system = Some(row[1].clone());
            }
            count += 1;
        }
        assert_eq!(count, 6);
        assert_eq!(friends_system, Some(Value::Bool(false)));
    }
}
