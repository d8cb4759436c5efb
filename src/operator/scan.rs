//! `ScanOperatorNode` (spec §4.6): a leaf operator reading a named table.

use std::sync::{Arc, Mutex};

use crate::block::BlockManager;
use crate::block_iterator::{BlockIterator, Row};
use crate::catalog::TableDescriptor;
use crate::schema::Schema;

use super::{ConnectError, Operator, OperatorError, OperatorState};

/// Reads a table's rows, projecting down to the column indices the query
/// actually references (unused columns are omitted from the output).
pub struct ScanOperator {
    table_name: String,
    projection: Vec<usize>,
    schema: Schema,
    iterator: BlockIterator,
    row: Row,
    state: OperatorState,
}

impl ScanOperator {
    pub fn new(table: &TableDescriptor, projection: Vec<usize>, manager: Arc<Mutex<BlockManager>>) -> Self {
        let schema = Schema::new(
            projection
                .iter()
                .map(|&i| table.schema.columns[i].clone())
                .collect(),
        );
        ScanOperator {
            table_name: table.name.clone(),
            projection,
            schema,
            iterator: BlockIterator::new(table.open(), manager),
            row: Row::new(),
            state: OperatorState::Connected,
        }
    }
}

impl Operator for ScanOperator {
    fn connect(&mut self, _input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        Err(ConnectError::TooManyInputs)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        if self.state == OperatorState::Drained {
            return Ok(None);
        }
        self.state = OperatorState::Producing;
        match self.iterator.get_next_row()? {
            Some(full_row) => {
                self.row = self.projection.iter().map(|&i| full_row[i].clone()).collect();
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
        out.push_str(&format!("ScanOperator({})", self.table_name));
    }
}
