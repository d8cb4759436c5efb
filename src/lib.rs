//! csvql — the physical execution core of a SQL-over-CSV query engine:
//! value representation, block pooling, the background block producer, the
//! stack-machine expression evaluator, the pull-iterator operator algebra,
//! aggregate functions, and a minimal in-memory catalog.
//!
//! A lexer/parser/planner is out of scope; callers assemble operator trees
//! directly through [`operator::factory`] and drive the root with
//! [`execute`].

pub mod aggregate;
pub mod block;
pub mod block_iterator;
pub mod block_provider;
pub mod catalog;
pub mod function_registry;
pub mod operator;
pub mod producer;
pub mod schema;
pub mod stack_machine;
pub mod value;

use operator::RootOperator;

/// Drives `plan_root` to exhaustion and returns the number of rows it
/// produced, or the first error encountered (spec §6, §7: first error wins,
/// no partial rollback).
pub fn execute(plan_root: &mut dyn RootOperator) -> anyhow::Result<i64> {
    log::debug!("executing plan: {}", {
        let mut dump = String::new();
        plan_root.dump(&mut dump);
        dump
    });
    let count = plan_root.process()?;
    log::debug!("plan produced {} row(s)", count);
    Ok(count)
}
