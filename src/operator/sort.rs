//! `SortOperatorNode` (spec §4.12): buffers all upstream rows, applies a
//! stable multi-key sort, then streams the buffered result.

use crate::block_iterator::Row;
use crate::schema::Schema;

use super::{ConnectError, Operator, OperatorError, OperatorState};

#[derive(Debug, Clone, Copy)]
pub struct OrderExpression {
    pub column_index: usize,
    pub ascending: bool,
}

pub struct SortOperator {
    input: Option<Box<dyn Operator>>,
    order_by: Vec<OrderExpression>,
    buffer: Vec<Row>,
    cursor: usize,
    buffered: bool,
    state: OperatorState,
}

impl SortOperator {
    pub fn new(order_by: Vec<OrderExpression>) -> Self {
        SortOperator {
            input: None,
            order_by,
            buffer: Vec::new(),
            cursor: 0,
            buffered: false,
            state: OperatorState::Unconnected,
        }
    }

    fn fill(&mut self) -> Result<(), OperatorError> {
        let input = self.input.as_mut().expect("Sort connected before use");
        while let Some(row) = input.get_next_row()? {
            self.buffer.push(row.clone());
        }
        let order_by = &self.order_by;
        self.buffer.sort_by(|a, b| {
            for key in order_by {
                let ord = a[key.column_index]
                    .compare(&b[key.column_index])
                    .unwrap_or(std::cmp::Ordering::Equal);
                let ord = if key.ascending { ord } else { ord.reverse() };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        self.buffered = true;
        Ok(())
    }
}

impl Operator for SortOperator {
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
        if !self.buffered {
            self.fill()?;
        }
        if self.cursor >= self.buffer.len() {
            self.state = OperatorState::Drained;
            return Ok(None);
        }
        let row = &self.buffer[self.cursor];
        self.cursor += 1;
        Ok(Some(row))
    }

    fn column_infos(&self) -> &Schema {
        self.input.as_ref().expect("Sort connected before use").column_infos()
    }

    fn dump(&self, out: &mut String) {
        super::dump_with_child(out, "SortOperator", self.input.as_ref().unwrap().as_ref());
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
    fn sorts_stably_ascending() {
        let rows: std::collections::VecDeque<Row> =
            vec![3, 1, 2].into_iter().map(|i| vec![Value::Int(i)]).collect();
        let mut sort = SortOperator::new(vec![OrderExpression {
            column_index: 0,
            ascending: true,
        }]);
        sort.connect(Box::new(VecOperator {
            rows,
            row: Row::new(),
            schema: Schema::new(vec![]),
        }))
        .unwrap();
        let mut seen = vec![];
        while let Some(row) = sort.get_next_row().unwrap() {
            seen.push(row[0].clone());
        }
        assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}
