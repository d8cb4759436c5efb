//! `CrossJoinOperatorNode` (spec §4.9): for each lhs row, replays the
//! entirety of rhs, emitting concatenated rows.

use std::sync::{Arc, Mutex};

use crate::block::BlockManager;
use crate::block_iterator::{CachingBlockIterator, Row};
use crate::block_provider::VecBlockProvider;
use crate::schema::Schema;

use super::{materialize, ConnectError, Operator, OperatorError, OperatorState};

pub struct CrossJoinOperator {
    lhs: Option<Box<dyn Operator>>,
    rhs_source: Option<Box<dyn Operator>>,
    rhs: Option<CachingBlockIterator>,
    manager: Arc<Mutex<BlockManager>>,
    schema: Schema,
    lhs_row: Row,
    row: Row,
    started_rhs_pass: bool,
    state: OperatorState,
}

impl CrossJoinOperator {
    pub fn new(manager: Arc<Mutex<BlockManager>>) -> Self {
        CrossJoinOperator {
            lhs: None,
            rhs_source: None,
            rhs: None,
            manager,
            schema: Schema::default(),
            lhs_row: Row::new(),
            row: Row::new(),
            started_rhs_pass: false,
            state: OperatorState::Unconnected,
        }
    }
}

impl Operator for CrossJoinOperator {
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        if self.lhs.is_none() {
            self.lhs = Some(input);
            return Ok(false);
        }
        if self.rhs_source.is_some() {
            return Err(ConnectError::TooManyInputs);
        }
        self.schema = Schema::concat(self.lhs.as_ref().unwrap().column_infos(), input.column_infos());
        self.rhs_source = Some(input);
        self.state = OperatorState::Connected;
        Ok(true)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        self.state = OperatorState::Producing;
        loop {
            if self.rhs.is_none() {
                let rhs_box = self.rhs_source.as_mut().expect("CrossJoin connected before use");
                let blocks = materialize(&mut **rhs_box, &self.manager)?;
                self.rhs = Some(CachingBlockIterator::new(
                    Box::new(VecBlockProvider::new(blocks)),
                    Arc::clone(&self.manager),
                ));
            }
            if !self.started_rhs_pass {
                let lhs = self.lhs.as_mut().expect("CrossJoin connected before use");
                match lhs.get_next_row()? {
                    Some(row) => {
                        self.lhs_row = row.clone();
                        self.started_rhs_pass = true;
                        self.rhs.as_mut().unwrap().rewind();
                    }
                    None => {
                        self.state = OperatorState::Drained;
                        return Ok(None);
                    }
                }
            }
            match self.rhs.as_mut().unwrap().get_next_row()? {
                Some(rhs_row) => {
                    let mut concatenated = self.lhs_row.clone();
                    concatenated.extend(rhs_row.iter().cloned());
                    self.row = concatenated;
                    return Ok(Some(&self.row));
                }
                None => {
                    self.started_rhs_pass = false;
                }
            }
        }
    }

    fn column_infos(&self) -> &Schema {
        &self.schema
    }

    fn dump(&self, out: &mut String) {
        out.push_str("CrossJoinOperator()\n-->");
        self.lhs.as_ref().unwrap().dump(out);
        out.push_str("\n-->");
        self.rhs_source.as_ref().unwrap().dump(out);
    }
}
