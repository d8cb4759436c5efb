//! `UnionOperatorNode` (spec §4.12): streams the first upstream to
//! exhaustion, then the second.

use crate::block_iterator::Row;
use crate::schema::Schema;

use super::{ConnectError, Operator, OperatorError, OperatorState};

pub struct UnionOperator {
    lhs: Option<Box<dyn Operator>>,
    rhs: Option<Box<dyn Operator>>,
    on_rhs: bool,
    state: OperatorState,
}

impl UnionOperator {
    pub fn new() -> Self {
        UnionOperator {
            lhs: None,
            rhs: None,
            on_rhs: false,
            state: OperatorState::Unconnected,
        }
    }
}

impl Default for UnionOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for UnionOperator {
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        if self.lhs.is_none() {
            self.lhs = Some(input);
            return Ok(false);
        }
        if self.rhs.is_some() {
            return Err(ConnectError::TooManyInputs);
        }
        if input.column_infos().arity() != self.lhs.as_ref().unwrap().column_infos().arity() {
            return Err(ConnectError::UnionArityMismatch);
        }
        self.rhs = Some(input);
        self.state = OperatorState::Connected;
        Ok(true)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        self.state = OperatorState::Producing;
        if !self.on_rhs {
            let lhs = self.lhs.as_mut().expect("Union connected before use");
            if let Some(row) = lhs.get_next_row()? {
                return Ok(Some(row));
            }
            self.on_rhs = true;
        }
        let rhs = self.rhs.as_mut().expect("Union connected before use");
        match rhs.get_next_row()? {
            Some(row) => Ok(Some(row)),
            None => {
                self.state = OperatorState::Drained;
                Ok(None)
            }
        }
    }

    fn column_infos(&self) -> &Schema {
        self.lhs.as_ref().expect("Union connected before use").column_infos()
    }

    fn dump(&self, out: &mut String) {
        out.push_str("UnionOperator()\n-->");
        self.lhs.as_ref().unwrap().dump(out);
        out.push_str("\n-->");
        self.rhs.as_ref().unwrap().dump(out);
    }
}
