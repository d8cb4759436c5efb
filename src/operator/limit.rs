//! `LimitOperatorNode` (spec §4.12): skips `offset` rows, then emits up to
//! `limit` rows.

use crate::block_iterator::Row;
use crate::schema::Schema;

use super::{ConnectError, Operator, OperatorError, OperatorState};

pub struct LimitOperator {
    input: Option<Box<dyn Operator>>,
    limit: i64,
    offset: i64,
    emitted: i64,
    skipped: i64,
    row: Row,
    state: OperatorState,
}

impl LimitOperator {
    pub fn new(limit: i64, offset: i64) -> Self {
        LimitOperator {
            input: None,
            limit,
            offset,
            emitted: 0,
            skipped: 0,
            row: Row::new(),
            state: OperatorState::Unconnected,
        }
    }
}

impl Operator for LimitOperator {
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        if self.input.is_some() {
            return Err(ConnectError::TooManyInputs);
        }
        self.input = Some(input);
        self.state = OperatorState::Connected;
        Ok(true)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        self.state = OperatorState::Producing;
        if self.emitted >= self.limit {
            self.state = OperatorState::Drained;
            return Ok(None);
        }
        let input = self.input.as_mut().expect("Limit connected before use");
        while self.skipped < self.offset {
            if input.get_next_row()?.is_none() {
                self.state = OperatorState::Drained;
                return Ok(None);
            }
            self.skipped += 1;
        }
        match input.get_next_row()? {
            Some(row) => {
                self.row = row.clone();
                self.emitted += 1;
                Ok(Some(&self.row))
            }
            None => {
                self.state = OperatorState::Drained;
                Ok(None)
            }
        }
    }

    fn column_infos(&self) -> &Schema {
        self.input.as_ref().expect("Limit connected before use").column_infos()
    }

    fn dump(&self, out: &mut String) {
        out.push_str(&format!("LimitOperator({},{})\n-->", self.limit, self.offset));
        self.input.as_ref().unwrap().dump(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    struct VecOperator {
        rows: std::collections::VecDeque<Row>,
        row: Row,
        schema: Schema,
    }
    impl Operator for VecOperator {
        fn connect(&mut self, _input: Box<dyn Operator>) -> Result<bool, ConnectError> {
            Err(ConnectError::TooManyInputs)
        }
        fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
            match self.rows.pop_front() {
                Some(r) => {
                    self.row = r;
                    Ok(Some(&self.row))
                }
                None => Ok(None),
            }
        }
        fn column_infos(&self) -> &Schema {
            &self.schema
        }
        fn dump(&self, out: &mut String) {
            out.push_str("VecOperator");
        }
    }

    #[test]
    fn skips_offset_then_emits_limit() {
        let rows: std::collections::VecDeque<Row> =
            (0..10).map(|i| vec![Value::Int(i)]).collect();
        let mut limit = LimitOperator::new(3, 2);
        limit
            .connect(Box::new(VecOperator {
                rows,
                row: Row::new(),
                schema: Schema::new(vec![]),
            }))
            .unwrap();
        let mut seen = vec![];
        while let Some(row) = limit.get_next_row().unwrap() {
            seen.push(row[0].clone());
        }
        assert_eq!(seen, vec![Value::Int(2), Value::Int(3), Value::Int(4)]);
    }
}
