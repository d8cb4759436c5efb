//! The physical operator algebra (spec §4.5-§4.13): pull-iterator tree
//! nodes composed by a query plan, each owning at most two upstream
//! operators.
//!
//! `Operator::get_next_row` mirrors `BlockIterator::get_next_row`: the
//! returned row borrows `&mut self` and stays valid only until the next
//! call, which the borrow checker enforces without needing a lifetime
//! parameter on the trait itself.

pub mod aggregation;
pub mod cross_join;
pub mod factory;
pub mod grouping;
pub mod inner_hash_join;
pub mod inner_join;
pub mod limit;
pub mod output_row;
pub mod project;
pub mod scan;
pub mod select;
pub mod sort;
pub mod system_scan;
pub mod union;

use std::sync::{Arc, Mutex};

use crate::aggregate::AggregateError;
use crate::block::{Block, BlockError, BlockManager};
use crate::block_iterator::Row;
use crate::block_provider::ProviderError;
use crate::function_registry::FunctionError;
use crate::schema::Schema;
use crate::stack_machine::EvalError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConnectError {
    #[error("unresolved variable {0}")]
    UnresolvedVariable(String),
    #[error("unresolved table {0}")]
    UnresolvedTable(String),
    #[error("operator already has its input(s) connected")]
    TooManyInputs,
    #[error("all elements of the select list of a group by have to be aggregations or contained in the group by expressions")]
    InvalidGroupBySelectList,
    #[error("COUNT(*) takes no argument, other aggregates take exactly one")]
    AggregateArity,
    #[error("inner hash join requires exactly one equi-join variable pair")]
    HashJoinArity,
    #[error("union requires schemas of equal arity")]
    UnionArityMismatch,
    #[error("operator is not yet connected")]
    NotConnected,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Function(#[from] FunctionError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("output sink write failed: {0}")]
    Io(String),
}

/// Operator lifecycle (spec §4.14): `get_next_row` in `Unconnected` is
/// undefined; in `Drained` it returns `Ok(None)` forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Unconnected,
    Connected,
    Producing,
    Drained,
}

pub trait Operator: Send {
    /// Attaches an upstream. Binary operators return `Ok(false)` after the
    /// first input to request a second; unary/leaf operators return
    /// `Ok(true)` or fail once already satisfied.
    fn connect(&mut self, input: Box<dyn Operator>) -> Result<bool, ConnectError>;
    fn get_next_row(&mut self) -> Result<Option<&Row>, OperatorError>;
    fn column_infos(&self) -> &Schema;
    fn dump(&self, out: &mut String);
}

pub trait RootOperator: Operator {
    fn process(&mut self) -> Result<i64, OperatorError>;
}

/// Drains `op` into fresh blocks from `manager`, returning them as a
/// `Vec<Block>`. Used to feed an upstream operator's rows into a
/// `CachingBlockIterator`/`HashingBlockIterator`/`GroupingBlockIterator`,
/// which are block-level (spec §4.2) rather than row-level abstractions.
pub(crate) fn materialize(
    op: &mut dyn Operator,
    manager: &Arc<Mutex<BlockManager>>,
) -> Result<Vec<Block>, OperatorError> {
    let mut blocks = Vec::new();
    let mut current = manager.lock().unwrap().create_block()?;
    while let Some(row) = op.get_next_row()? {
        for value in row {
            if !current.add_value(value.clone()) {
                current.mark_next_block();
                let finished = std::mem::replace(&mut current, manager.lock().unwrap().create_block()?);
                blocks.push(finished);
                current.add_value(value.clone());
            }
        }
        current.next_row();
    }
    current.end_blocks();
    blocks.push(current);
    Ok(blocks)
}

/// Standard two-line EXPLAIN rendering: `name\n-->child`.
pub(crate) fn dump_with_child(out: &mut String, name: &str, child: &dyn Operator) {
    out.push_str(name);
    out.push_str("\n-->");
    child.dump(out);
}
