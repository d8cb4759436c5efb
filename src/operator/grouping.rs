//! `GroupingOperatorNode` (spec §4.8): GROUP BY, delegating the actual
//! partitioning to `GroupingBlockIterator`.

use std::sync::{Arc, Mutex};

use crate::aggregate::AggregateFunction;
use crate::block::BlockManager;
use crate::block_iterator::{GroupingBlockIterator, Row};
use crate::schema::Schema;

use super::{materialize, ConnectError, Operator, OperatorError, OperatorState};

pub struct GroupingOperator {
    input: Option<Box<dyn Operator>>,
    grouping_indices: Vec<usize>,
    output_columns: Vec<usize>,
    template_funcs: Vec<Box<dyn AggregateFunction>>,
    manager: Arc<Mutex<BlockManager>>,
    schema: Schema,
    iterator: Option<GroupingBlockIterator>,
    state: OperatorState,
}

impl GroupingOperator {
    /// `output_columns[i]` names the upstream column `template_funcs[i]`
    /// consumes; `schema` is the already-assembled output schema (group
    /// keys followed by non-suppressed aggregate results, per spec
    /// §4.8's column ordering).
    pub fn new(
        grouping_indices: Vec<usize>,
        output_columns: Vec<usize>,
        template_funcs: Vec<Box<dyn AggregateFunction>>,
        schema: Schema,
        manager: Arc<Mutex<BlockManager>>,
    ) -> Self {
        GroupingOperator {
            input: None,
            grouping_indices,
            output_columns,
            template_funcs,
            manager,
            schema,
            iterator: None,
            state: OperatorState::Unconnected,
        }
    }
}

impl Operator for GroupingOperator {
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
        if self.iterator.is_none() {
            let input_box = self.input.as_mut().expect("Grouping connected before use");
            let blocks = materialize(&mut **input_box, &self.manager)?;
            let mut provider = crate::block_provider::VecBlockProvider::new(blocks);
            self.iterator = Some(GroupingBlockIterator::build(
                &mut provider,
                &self.manager,
                &self.grouping_indices,
                &self.output_columns,
                &self.template_funcs,
            )?);
        }
        match self.iterator.as_mut().unwrap().get_next_row() {
            Some(row) => Ok(Some(row)),
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
        super::dump_with_child(out, "GroupingOperator", self.input.as_ref().unwrap().as_ref());
    }
}
