//! `OutputRowOperatorNode` (spec §4.12, §6): root operator writing the
//! textual result format. Grounded in
//! `examples/original_source/csvsqldb/operatornodes/output_row_operatornode.cpp`.

use std::io::Write;

use crate::block_iterator::Row;
use crate::schema::Schema;
use crate::value::Value;

use super::{ConnectError, Operator, OperatorError, OperatorState, RootOperator};

const FLUSH_EVERY: i64 = 1000;

pub struct OutputRowOperator<W: Write> {
    input: Option<Box<dyn Operator>>,
    sink: W,
    show_header: bool,
    buffer: String,
    state: OperatorState,
}

impl<W: Write> OutputRowOperator<W> {
    pub fn new(sink: W, show_header: bool) -> Self {
        OutputRowOperator {
            input: None,
            sink,
            show_header,
            buffer: String::new(),
            state: OperatorState::Unconnected,
        }
    }

    fn write_header(&mut self) {
        let schema = self.input.as_ref().expect("OutputRow connected before use").column_infos();
        self.buffer.push('#');
        for (i, col) in schema.columns.iter().enumerate() {
            if i > 0 {
                self.buffer.push(',');
            }
            self.buffer.push_str(&col.name);
        }
        self.buffer.push('\n');
    }

    fn write_row(&mut self, row: &Row) {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                self.buffer.push(',');
            }
            write_value(&mut self.buffer, value);
        }
        self.buffer.push('\n');
    }

    fn flush(&mut self) -> Result<(), std::io::Error> {
        self.sink.write_all(self.buffer.as_bytes())?;
        self.buffer.clear();
        Ok(())
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::String(s) => {
            out.push('\'');
            out.push_str(s);
            out.push('\'');
        }
        other => out.push_str(&other.to_string()),
    }
}

impl<W: Write + Send> Operator for OutputRowOperator<W> {
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError> {
        if self.input.is_some() {
            return Err(ConnectError::TooManyInputs);
        }
        self.input = Some(input);
        self.state = OperatorState::Connected;
        Ok(true)
    }

    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError> {
        // A root operator is normally driven via `process()`; this just
        // passes rows through unmodified so the trait remains total.
        Ok(self.input.as_mut().expect("OutputRow connected before use").get_next_row()?)
    }

    fn column_infos(&self) -> &Schema {
        self.input.as_ref().expect("OutputRow connected before use").column_infos()
    }

    fn dump(&self, out: &mut String) {
        let schema = self.input.as_ref().expect("OutputRow connected before use").column_infos();
        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        out.push_str(&format!("OutputRowOperator({})\n-->", names.join(",")));
        self.input.as_ref().unwrap().dump(out);
    }
}

impl<W: Write + Send> RootOperator for OutputRowOperator<W> {
    fn process(&mut self) -> Result<i64, OperatorError> {
        self.state = OperatorState::Producing;
        if self.show_header {
            self.write_header();
        }
        let mut count: i64 = 0;
        loop {
            let input = self.input.as_mut().expect("OutputRow connected before use");
            let row = match input.get_next_row()? {
                Some(row) => row.clone(),
                None => break,
            };
            self.write_row(&row);
            count += 1;
            if count % FLUSH_EVERY == 0 {
                self.flush().map_err(|e| OperatorError::Io(e.to_string()))?;
            }
        }
        self.flush().map_err(|e| OperatorError::Io(e.to_string()))?;
        self.state = OperatorState::Drained;
        Ok(count)
    }
}
