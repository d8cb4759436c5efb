//! `SelectOperatorNode` (spec §4.7): row filter over a compiled predicate.

use crate::block_iterator::Row;
use crate::function_registry::FunctionRegistry;
use crate::schema::Schema;
use crate::stack_machine::{StackMachine, VariableMapping, VariableStore};
use std::sync::Arc;

use super::{ConnectError, Operator, OperatorError, OperatorState};

pub struct SelectOperator {
    input: Option<Box<dyn Operator>>,
    predicate: StackMachine,
    mapping: VariableMapping,
    /// `(row column index, variable slot)`, resolved once at `connect`.
    resolved: Vec<(usize, usize)>,
    functions: Arc<FunctionRegistry>,
    store: VariableStore,
    row: Row,
    state: OperatorState,
}

impl SelectOperator {
    pub fn new(predicate: StackMachine, mapping: VariableMapping, functions: Arc<FunctionRegistry>) -> Self {
        SelectOperator {
            input: None,
            predicate,
            mapping,
            resolved: Vec::new(),
            functions,
            store: VariableStore::new(),
            row: Row::new(),
            state: OperatorState::Unconnected,
        }
    }

    /// Resolves every mapped column name against `schema` once, per spec
    /// §4.7 ("unresolved names fail at connect").
    fn bind(&mut self, schema: &Schema) -> Result<(), ConnectError> {
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
        Ok(())
    }

    fn refill(&mut self, row: &[crate::value::Value]) {
        for (idx, slot) in &self.resolved {
            self.store.set(*slot, row[*idx].clone());
        }
    }
}

impl Operator for SelectOperator {
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        if self.input.is_some() {
            return Err(ConnectError::TooManyInputs);
        }
        self.bind(input.column_infos())?;
        self.input = Some(input);
        self.state = OperatorState::Connected;
        Ok(true)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        self.state = OperatorState::Producing;
        loop {
            let input = self.input.as_mut().expect("Select connected before use");
            let row = match input.get_next_row()? {
                Some(row) => row.clone(),
                None => {
                    self.state = OperatorState::Drained;
                    return Ok(None);
                }
            };
            self.refill(&row);
            let result = self.predicate.evaluate(&self.store, &self.functions)?;
            if result.is_truthy() {
                self.row = row;
                return Ok(Some(&self.row));
            }
        }
    }

    fn column_infos(&self) -> &Schema {
        self.input.as_ref().expect("Select connected before use").column_infos()
    }

    fn dump(&self, out: &mut String) {
        super::dump_with_child(out, "SelectOperator", self.input.as_ref().unwrap().as_ref());
    }
}
