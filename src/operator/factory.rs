//! `OperatorNodeFactory` (spec §4.13, SPEC_FULL.md §1): constructor-style
//! functions that assemble operator nodes from already-resolved schemas and
//! compiled expressions, bypassing the lexer/parser/AST that stay out of
//! scope here. `OperatorContext` bundles the resources every constructor
//! needs so none of them have to thread catalog/registry/manager arguments
//! through by hand.

use std::sync::{Arc, Mutex};

use crate::aggregate::AggregateFunction;
use crate::block::BlockManager;
use crate::catalog::Catalog;
use crate::function_registry::FunctionRegistry;
use crate::schema::Schema;
use crate::stack_machine::{StackMachine, VariableMapping};

use super::aggregation::{AggregateColumn, AggregationOperator};
use super::cross_join::CrossJoinOperator;
use super::grouping::GroupingOperator;
use super::inner_hash_join::InnerHashJoinOperator;
use super::inner_join::InnerJoinOperator;
use super::limit::LimitOperator;
use super::output_row::OutputRowOperator;
use super::project::{OutputColumn, ProjectOperator};
use super::scan::ScanOperator;
use super::select::SelectOperator;
use super::sort::{OrderExpression, SortOperator};
use super::system_scan::{SystemScanOperator, SystemTableKind};
use super::union::UnionOperator;
use super::ConnectError;

/// Execution flags (SPEC_FULL.md §2, component I): currently just whether a
/// result sink should emit the `#col,...` header row.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionFlags {
    pub show_header: bool,
}

impl Default for ExecutionFlags {
    fn default() -> Self {
        ExecutionFlags { show_header: true }
    }
}

/// Resources every operator constructor draws from: a catalog handle for
/// table resolution, the shared function registry, the block manager used
/// for any materialization an operator needs, and execution flags.
pub struct OperatorContext {
    pub catalog: Arc<dyn Catalog + Send + Sync>,
    pub functions: Arc<FunctionRegistry>,
    pub manager: Arc<Mutex<BlockManager>>,
    pub flags: ExecutionFlags,
}

impl OperatorContext {
    pub fn new(
        catalog: Arc<dyn Catalog + Send + Sync>,
        functions: Arc<FunctionRegistry>,
        manager: Arc<Mutex<BlockManager>>,
        flags: ExecutionFlags,
    ) -> Self {
        OperatorContext {
            catalog,
            functions,
            manager,
            flags,
        }
    }
}

/// Builds a `ScanOperator` for `table_name`, projecting down to the given
/// column indices. Fails if the catalog has no such table.
pub fn scan(ctx: &OperatorContext, table_name: &str, projection: Vec<usize>) -> Result<ScanOperator, ConnectError> {
    let table = ctx
        .catalog
        .get_table(table_name)
        .ok_or_else(|| ConnectError::UnresolvedTable(table_name.to_string()))?;
    Ok(ScanOperator::new(table, projection, Arc::clone(&ctx.manager)))
}

pub fn system_scan(ctx: &OperatorContext, kind: SystemTableKind) -> SystemScanOperator {
    SystemScanOperator::new(kind, ctx.catalog.as_ref(), ctx.functions.as_ref(), Arc::clone(&ctx.manager))
}

pub fn select(ctx: &OperatorContext, predicate: StackMachine, mapping: VariableMapping) -> SelectOperator {
    SelectOperator::new(predicate, mapping, Arc::clone(&ctx.functions))
}

pub fn project(ctx: &OperatorContext, columns: Vec<OutputColumn>, output_schema: Schema) -> ProjectOperator {
    ProjectOperator::new(columns, output_schema, Arc::clone(&ctx.functions))
}

pub fn limit(limit: i64, offset: i64) -> LimitOperator {
    LimitOperator::new(limit, offset)
}

pub fn sort(order_by: Vec<OrderExpression>) -> SortOperator {
    SortOperator::new(order_by)
}

pub fn union() -> UnionOperator {
    UnionOperator::new()
}

pub fn cross_join(ctx: &OperatorContext) -> CrossJoinOperator {
    CrossJoinOperator::new(Arc::clone(&ctx.manager))
}

pub fn inner_join(ctx: &OperatorContext, predicate: StackMachine, mapping: VariableMapping) -> InnerJoinOperator {
    InnerJoinOperator::new(predicate, mapping, Arc::clone(&ctx.functions), Arc::clone(&ctx.manager))
}

/// `lhs_key_col`/`rhs_key_col` must each resolve into exactly one side's
/// schema (spec §4.10); callers with more than one equi-join predicate
/// should build an `InnerJoinOperator` over a `CrossJoinOperator` instead.
pub fn inner_hash_join(ctx: &OperatorContext, lhs_key_col: usize, rhs_key_col: usize) -> InnerHashJoinOperator {
    InnerHashJoinOperator::new(lhs_key_col, rhs_key_col, Arc::clone(&ctx.manager))
}

pub fn grouping(
    ctx: &OperatorContext,
    grouping_indices: Vec<usize>,
    output_columns: Vec<usize>,
    template_funcs: Vec<Box<dyn AggregateFunction>>,
    schema: Schema,
) -> GroupingOperator {
    GroupingOperator::new(grouping_indices, output_columns, template_funcs, schema, Arc::clone(&ctx.manager))
}

pub fn aggregation(ctx: &OperatorContext, columns: Vec<AggregateColumn>, schema: Schema) -> AggregationOperator {
    AggregationOperator::new(columns, schema, Arc::clone(&ctx.functions), Arc::clone(&ctx.manager))
}

pub fn output_row<W: std::io::Write>(ctx: &OperatorContext, sink: W) -> OutputRowOperator<W> {
    OutputRowOperator::new(sink, ctx.flags.show_header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, DEFAULT_BLOCK_CAPACITY_BYTES};
    use crate::block_provider::{BlockProvider, ProviderError};
    use crate::catalog::{InMemoryCatalog, RowSource, TableDescriptor};
    use crate::schema::SymbolInfo;
    use crate::value::ValueKind;
    use crate::operator::Operator;

    struct EmptyProvider;
    impl BlockProvider for EmptyProvider {
        fn get_next_block(&mut self) -> Result<Option<Block>, ProviderError> {
            Ok(None)
        }
    }

    fn test_context() -> OperatorContext {
        let mut catalog = InMemoryCatalog::new();
        let schema = Schema::new(vec![SymbolInfo::new("id", "FRIENDS", ValueKind::Int)]);
        let source: RowSource = Arc::new(|| Box::new(EmptyProvider));
        catalog.add_table(TableDescriptor::new("FRIENDS", schema, false, source)).unwrap();
        OperatorContext::new(
            Arc::new(catalog),
            Arc::new(FunctionRegistry::new()),
            Arc::new(Mutex::new(BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES))),
            ExecutionFlags::default(),
        )
    }

    #[test]
    fn scan_resolves_table_from_catalog() {
        let ctx = test_context();
        let op = scan(&ctx, "FRIENDS", vec![0]).unwrap();
        assert_eq!(op.column_infos().arity(), 1);
    }

    #[test]
    fn scan_unknown_table_fails() {
        let ctx = test_context();
        assert!(matches!(scan(&ctx, "NOPE", vec![]), Err(ConnectError::UnresolvedTable(_))));
    }
}
