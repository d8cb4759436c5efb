//! `InnerJoinOperatorNode` (spec §4.9): a cross join filtered by a compiled
//! predicate evaluated against the concatenated row.

use std::sync::{Arc, Mutex};

use crate::block::BlockManager;
use crate::block_iterator::Row;
use crate::function_registry::FunctionRegistry;
use crate::schema::Schema;
use crate::stack_machine::{StackMachine, VariableMapping, VariableStore};

use super::cross_join::CrossJoinOperator;
use super::{ConnectError, Operator, OperatorError, OperatorState};

pub struct InnerJoinOperator {
    cross: CrossJoinOperator,
    predicate: StackMachine,
    mapping: VariableMapping,
    resolved: Vec<(usize, usize)>,
    functions: Arc<FunctionRegistry>,
    store: VariableStore,
    row: Row,
    state: OperatorState,
}

impl InnerJoinOperator {
    pub fn new(
        predicate: StackMachine,
        mapping: VariableMapping,
        functions: Arc<FunctionRegistry>,
        manager: Arc<Mutex<BlockManager>>,
    ) -> Self {
        InnerJoinOperator {
            cross: CrossJoinOperator::new(manager),
            predicate,
            mapping,
            resolved: Vec::new(),
            functions,
            store: VariableStore::new(),
            row: Row::new(),
            state: OperatorState::Unconnected,
        }
    }
}

impl Operator for InnerJoinOperator {
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        let needs_more = self.cross.connect(input)?;
        if !needs_more {
            let schema = self.cross.column_infos();
            self.resolved = self
                .mapping
                .iter()
                .map(|(name, slot)| {
                    schema
                        .find(name)
                        .map(|idx| (idx, *slot))
                        .ok_or_else(|| ConnectError::UnresolvedVariable(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.state = OperatorState::Connected;
        }
        Ok(needs_more)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        self.state = OperatorState::Producing;
        loop {
            let row = match self.cross.get_next_row()? {
                Some(row) => row.clone(),
                None => {
                    self.state = OperatorState::Drained;
                    return Ok(None);
                }
            };
            for (idx, slot) in &self.resolved {
                self.store.set(*slot, row[*idx].clone());
            }
            if self.predicate.evaluate(&self.store, &self.functions)?.is_truthy() {
                self.row = row;
                return Ok(Some(&self.row));
            }
        }
    }

    fn column_infos(&self) -> &Schema {
        self.cross.column_infos()
    }

    fn dump(&self, out: &mut String) {
        out.push_str("InnerJoinOperator()\n-->");
        self.cross.dump(out);
    }
}
