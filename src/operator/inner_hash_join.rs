//! `InnerHashJoinOperatorNode` (spec §4.10): a single-equi-join-column hash
//! join. The rhs is hashed by its join column; for each lhs row the
//! operator streams the matching rhs bucket.

use std::sync::{Arc, Mutex};

use crate::block::BlockManager;
use crate::block_iterator::{HashingBlockIterator, Row};
use crate::block_provider::VecBlockProvider;
use crate::schema::Schema;

use super::{materialize, ConnectError, Operator, OperatorError, OperatorState};

pub struct InnerHashJoinOperator {
    lhs: Option<Box<dyn Operator>>,
    rhs_source: Option<Box<dyn Operator>>,
    rhs: Option<HashingBlockIterator>,
    manager: Arc<Mutex<BlockManager>>,
    lhs_key_col: usize,
    rhs_key_col: usize,
    schema: Schema,
    lhs_row: Row,
    row: Row,
    in_bucket: bool,
    state: OperatorState,
}

impl InnerHashJoinOperator {
    /// `lhs_key_col`/`rhs_key_col` are the single equi-join column indices
    /// the compiler identified in each side's schema (spec §4.10: "exactly
    /// one should resolve into the rhs schema and exactly one into the
    /// lhs schema").
    pub fn new(lhs_key_col: usize, rhs_key_col: usize, manager: Arc<Mutex<BlockManager>>) -> Self {
        InnerHashJoinOperator {
            lhs: None,
            rhs_source: None,
            rhs: None,
            manager,
            lhs_key_col,
            rhs_key_col,
            schema: Schema::default(),
            lhs_row: Row::new(),
            row: Row::new(),
            in_bucket: false,
            state: OperatorState::Unconnected,
        }
    }
}

impl Operator for InnerHashJoinOperator {
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
                let rhs_box = self.rhs_source.as_mut().expect("InnerHashJoin connected before use");
                let blocks = materialize(&mut **rhs_box, &self.manager)?;
                self.rhs = Some(HashingBlockIterator::new(
                    Box::new(VecBlockProvider::new(blocks)),
                    Arc::clone(&self.manager),
                    self.rhs_key_col,
                ));
            }
            if self.in_bucket {
                if let Some(rhs_row) = self.rhs.as_mut().unwrap().get_next_key_value_row() {
                    let mut concatenated = self.lhs_row.clone();
                    concatenated.extend(rhs_row.iter().cloned());
                    self.row = concatenated;
                    return Ok(Some(&self.row));
                }
                self.in_bucket = false;
            }
            let lhs = self.lhs.as_mut().expect("InnerHashJoin connected before use");
            match lhs.get_next_row()? {
                Some(row) => {
                    self.lhs_row = row.clone();
                    let key = self.lhs_row[self.lhs_key_col].clone();
                    self.rhs.as_mut().unwrap().set_context_for_key_value(key)?;
                    self.in_bucket = true;
                }
                None => {
                    self.rhs.as_mut().unwrap().reset();
                    self.state = OperatorState::Drained;
                    return Ok(None);
                }
            }
        }
    }

    fn column_infos(&self) -> &Schema {
        &self.schema
    }

    fn dump(&self, out: &mut String) {
        out.push_str("InnerHashJoinOperator()\n-->");
        self.lhs.as_ref().unwrap().dump(out);
        out.push_str("\n-->");
        self.rhs_source.as_ref().unwrap().dump(out);
    }
}
