//! `ExtendedProjectionOperatorNode` (spec §4.12): evaluates one compiled
//! expression per output column, producing a new row under a declared
//! output schema. A pass-through column is just `PUSHVAR(i)`.

use crate::block_iterator::Row;
use crate::function_registry::FunctionRegistry;
use crate::schema::Schema;
use crate::stack_machine::{StackMachine, VariableMapping, VariableStore};
use std::sync::Arc;

use super::{ConnectError, Operator, OperatorError, OperatorState};

pub struct OutputColumn {
    pub expression: StackMachine,
    pub mapping: VariableMapping,
}

pub struct ProjectOperator {
    input: Option<Box<dyn Operator>>,
    columns: Vec<OutputColumn>,
    /// Per output column, `(row column index, variable slot)` pairs.
    resolved: Vec<Vec<(usize, usize)>>,
    output_schema: Schema,
    functions: Arc<FunctionRegistry>,
    store: VariableStore,
    row: Row,
    state: OperatorState,
}

impl ProjectOperator {
    pub fn new(columns: Vec<OutputColumn>, output_schema: Schema, functions: Arc<FunctionRegistry>) -> Self {
        ProjectOperator {
            input: None,
            columns,
            resolved: Vec::new(),
            output_schema,
            functions,
            store: VariableStore::new(),
            row: Row::new(),
            state: OperatorState::Unconnected,
        }
    }
}

impl Operator for ProjectOperator {
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        if self.input.is_some() {
            return Err(ConnectError::TooManyInputs);
        }
        let schema = input.column_infos();
        self.resolved = self
            .columns
            .iter()
            .map(|col| {
                col.mapping
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
        let input = self.input.as_mut().expect("Project connected before use");
        let source = match input.get_next_row()? {
            Some(row) => row.clone(),
            None => {
                self.state = OperatorState::Drained;
                return Ok(None);
            }
        };
        let mut out = Row::with_capacity(self.columns.len());
        for (col, resolved) in self.columns.iter().zip(self.resolved.iter()) {
            for (idx, slot) in resolved {
                self.store.set(*slot, source[*idx].clone());
            }
            out.push(col.expression.evaluate(&self.store, &self.functions)?);
        }
        self.row = out;
        Ok(Some(&self.row))
    }

    fn column_infos(&self) -> &Schema {
        &self.output_schema
    }

    fn dump(&self, out: &mut String) {
        super::dump_with_child(out, "ExtendedProjectionOperator", self.input.as_ref().unwrap().as_ref());
    }
}
