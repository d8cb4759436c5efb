//! `AggregationOperatorNode` (spec §4.8): ungrouped aggregation. Each
//! configured aggregate has its own argument expression (a sub-stack-machine,
//! so arguments may themselves be computed), stepped once per upstream row.
//! The REDESIGN FLAGS-noted `n` counter from the original source (reset
//! every row, with no observable effect) is not reproduced here.

use std::sync::{Arc, Mutex};

use crate::aggregate::AggregateFunction;
use crate::block::{Block, BlockManager, DEFAULT_BLOCK_CAPACITY_BYTES};
use crate::block_iterator::{BlockIterator, Row};
use crate::block_provider::VecBlockProvider;
use crate::function_registry::FunctionRegistry;
use crate::schema::Schema;
use crate::stack_machine::{StackMachine, VariableMapping, VariableStore};

use super::{ConnectError, Operator, OperatorError, OperatorState};

/// One output column: an aggregate function fed by a compiled argument
/// expression (`PUSHVAR`-only for a plain column reference; COUNT(*) uses
/// a constant expression and ignores its evaluated value).
pub struct AggregateColumn {
    pub function: Box<dyn AggregateFunction>,
    pub arg_expression: StackMachine,
    pub arg_mapping: VariableMapping,
}

pub struct AggregationOperator {
    input: Option<Box<dyn Operator>>,
    columns: Vec<AggregateColumn>,
    resolved: Vec<Vec<(usize, usize)>>,
    functions: Arc<FunctionRegistry>,
    store: VariableStore,
    manager: Arc<Mutex<BlockManager>>,
    schema: Schema,
    iterator: Option<BlockIterator>,
    row: Row,
    state: OperatorState,
}

impl AggregationOperator {
    pub fn new(
        columns: Vec<AggregateColumn>,
        schema: Schema,
        functions: Arc<FunctionRegistry>,
        manager: Arc<Mutex<BlockManager>>,
    ) -> Self {
        AggregationOperator {
            input: None,
            columns,
            resolved: Vec::new(),
            functions,
            store: VariableStore::new(),
            manager,
            schema,
            iterator: None,
            row: Row::new(),
            state: OperatorState::Unconnected,
        }
    }

    fn run(&mut self) -> Result<Block, OperatorError> {
        for c in &mut self.columns {
            c.function.init();
        }
        let input = self.input.as_mut().expect("Aggregation connected before use");
        while let Some(row) = input.get_next_row()? {
            for (col, resolved) in self.columns.iter_mut().zip(self.resolved.iter()) {
                for (idx, slot) in resolved {
                    self.store.set(*slot, row[*idx].clone());
                }
                let arg = col.arg_expression.evaluate(&self.store, &self.functions)?;
                col.function.step(&arg)?;
            }
        }
        let mut block = Block::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        for c in &self.columns {
            block.add_value(c.function.finalize());
        }
        block.next_row();
        block.end_blocks();
        Ok(block)
    }
}

impl Operator for AggregationOperator {
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        if self.input.is_some() {
            return Err(ConnectError::TooManyInputs);
        }
        let schema = input.column_infos();
        self.resolved = self
            .columns
            .iter()
            .map(|c| {
                c.arg_mapping
                    .iter()
                    .map(|(name, slot)| {
                        schema
                            .find(name)
                            .map(|idx| (idx, *slot))
                            .ok_or_else(|| ConnectError::UnresolvedVariable(name.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.input = Some(input);
        self.state = OperatorState::Connected;
        Ok(true)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        self.state = OperatorState::Producing;
        if self.iterator.is_none() {
            let block = self.run()?;
            self.iterator = Some(BlockIterator::new(
                Box::new(VecBlockProvider::new(vec![block])),
                Arc::clone(&self.manager),
            ));
        }
        match self.iterator.as_mut().unwrap().get_next_row()? {
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
        let names: Vec<&str> = self.columns.iter().map(|c| c.function.name()).collect();
        out.push_str(&format!("AggregationOperator({})\n-->", names.join(",")));
        self.input.as_ref().unwrap().dump(out);
    }
}
