//! End-to-end plans assembled directly through `operator::factory`,
//! exercising the scenarios a lexer/parser would otherwise drive.

use std::sync::{Arc, Mutex};

use csvql::aggregate::{self, AggregateKind};
use csvql::block::{Block, BlockManager, DEFAULT_BLOCK_CAPACITY_BYTES};
use csvql::block_provider::{BlockProvider, ProviderError};
use csvql::catalog::{InMemoryCatalog, RowSource, TableDescriptor};
use csvql::function_registry::FunctionRegistry;
use csvql::operator::aggregation::AggregateColumn;
use csvql::operator::factory::{self, ExecutionFlags, OperatorContext};
use csvql::operator::system_scan::SystemTableKind;
use csvql::operator::Operator;
use csvql::schema::{Schema, SymbolInfo};
use csvql::stack_machine::{OpCode, StackMachine};
use csvql::value::{Value, ValueKind};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct FixedRowsProvider {
    blocks: Vec<Block>,
}

impl BlockProvider for FixedRowsProvider {
    fn get_next_block(&mut self) -> Result<Option<Block>, ProviderError> {
        Ok(if self.blocks.is_empty() {
            None
        } else {
            Some(self.blocks.remove(0))
        })
    }
}

fn int_column_table(name: &str, values: &[i64]) -> TableDescriptor {
    let schema = Schema::new(vec![SymbolInfo::new("a", name, ValueKind::Int)]);
    let values: Vec<i64> = values.to_vec();
    let source: RowSource = Arc::new(move || {
        let mut block = Block::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        for v in &values {
            block.add_int(*v, false);
            block.next_row();
        }
        block.end_blocks();
        Box::new(FixedRowsProvider { blocks: vec![block] })
    });
    TableDescriptor::new(name, schema, false, source)
}

fn test_context(catalog: InMemoryCatalog) -> OperatorContext {
    OperatorContext::new(
        Arc::new(catalog),
        Arc::new(FunctionRegistry::new()),
        Arc::new(Mutex::new(BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES))),
        ExecutionFlags::default(),
    )
}

/// S1: `SUM(a)` over a ten-row table of 0..9 is 45.
#[test]
fn sum_over_scan_matches_gauss_sum() {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(int_column_table("NUMBERS", &(0..10).collect::<Vec<_>>())).unwrap();
    let ctx = test_context(catalog);

    let scan = factory::scan(&ctx, "NUMBERS", vec![0]).unwrap();
    let mut arg = StackMachine::new();
    arg.add_instruction(OpCode::PushVar(0));
    let columns = vec![AggregateColumn {
        function: aggregate::create(AggregateKind::Sum, ValueKind::Int),
        arg_expression: arg,
        arg_mapping: vec![("a".to_string(), 0)],
    }];
    let out_schema = Schema::new(vec![SymbolInfo::new("sum_a", "", ValueKind::Int)]);
    let mut agg = factory::aggregation(&ctx, columns, out_schema);
    agg.connect(Box::new(scan)).unwrap();

    let row = agg.get_next_row().unwrap().expect("one aggregate row");
    assert_eq!(row[0], Value::Int(45));
    assert!(agg.get_next_row().unwrap().is_none());
}

/// S2: a predicate filters rows down to the matching subset.
#[test]
fn select_filters_by_predicate() {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(int_column_table("ROWS", &[1, 2, 3, 4, 5])).unwrap();
    let ctx = test_context(catalog);

    let scan = factory::scan(&ctx, "ROWS", vec![0]).unwrap();
    let mut predicate = StackMachine::new();
    predicate.add_instruction(OpCode::Push(Value::Int(3)));
    predicate.add_instruction(OpCode::PushVar(0));
    predicate.add_instruction(OpCode::Gt);
    let mut select = factory::select(&ctx, predicate, vec![("a".to_string(), 0)]);
    select.connect(Box::new(scan)).unwrap();

    let mut seen = vec![];
    while let Some(row) = select.get_next_row().unwrap() {
        seen.push(row[0].clone());
    }
    assert_eq!(seen, vec![Value::Int(4), Value::Int(5)]);
}

/// S3: a 2000-row background producer round-trips through a scan pipeline.
#[test]
fn background_producer_round_trips_through_scan() {
    let schema = Schema::new(vec![SymbolInfo::new("a", "WIDE", ValueKind::Int)]);
    let source: RowSource = Arc::new(|| {
        let mgr = BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        let mut producer = csvql::producer::BlockProducer::new(mgr);
        producer.start(|h| {
            for i in 0..2000i64 {
                h.add_int(i, false);
                h.next_row();
            }
            Ok(())
        });
        Box::new(producer)
    });
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(TableDescriptor::new("WIDE", schema, false, source)).unwrap();
    let ctx = test_context(catalog);

    let mut scan = factory::scan(&ctx, "WIDE", vec![0]).unwrap();
    let mut count = 0;
    while scan.get_next_row().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 2000);
}

/// S4: a reader failure surfaces through the operator chain, not just the
/// raw producer.
#[test]
fn producer_failure_propagates_through_scan() {
    let schema = Schema::new(vec![SymbolInfo::new("a", "BROKEN", ValueKind::Int)]);
    let source: RowSource = Arc::new(|| {
        let mgr = BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        let mut producer = csvql::producer::BlockProducer::new(mgr);
        producer.start(|h| {
            h.add_int(1, false);
            h.next_row();
            Err("reader exploded".to_string())
        });
        Box::new(producer)
    });
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(TableDescriptor::new("BROKEN", schema, false, source)).unwrap();
    let ctx = test_context(catalog);

    let mut scan = factory::scan(&ctx, "BROKEN", vec![0]).unwrap();
    assert!(scan.get_next_row().unwrap().is_some());
    assert!(scan.get_next_row().is_err());
}

/// S5: `OutputRow`'s exact textual format, header plus one NULL field.
#[test]
fn output_row_formats_header_and_null_exactly() {
    let mut catalog = InMemoryCatalog::new();
    let schema = Schema::new(vec![
        SymbolInfo::new("id", "PEOPLE", ValueKind::Int),
        SymbolInfo::new("name", "PEOPLE", ValueKind::String),
        SymbolInfo::new("nickname", "PEOPLE", ValueKind::String),
    ]);
    let source: RowSource = Arc::new(|| {
        let mut block = Block::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        block.add_int(4711, false);
        block.add_string("Lars", false);
        block.add_string("", true);
        block.next_row();
        block.end_blocks();
        Box::new(FixedRowsProvider { blocks: vec![block] })
    });
    catalog.add_table(TableDescriptor::new("PEOPLE", schema, false, source)).unwrap();
    let ctx = test_context(catalog);

    let scan = factory::scan(&ctx, "PEOPLE", vec![0, 1, 2]).unwrap();
    let buf = SharedBuf::default();
    let mut output = factory::output_row(&ctx, buf.clone());
    output.connect(Box::new(scan)).unwrap();
    let count = csvql::execute(&mut output).unwrap();
    assert_eq!(count, 1);
    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    assert_eq!(text, "#id,name,nickname\n4711,'Lars',NULL\n");
}

/// S6: `SYSTEM_TABLES` carries exactly the declared tables, system-flagged
/// correctly.
#[test]
fn system_tables_scan_matches_registered_tables() {
    let mut catalog = InMemoryCatalog::new();
    catalog.add_table(int_column_table("FRIENDS", &[1])).unwrap();
    for name in ["SYSTEM_DUAL", "SYSTEM_TABLES", "SYSTEM_COLUMNS", "SYSTEM_FUNCTIONS", "SYSTEM_PARAMETERS"] {
        catalog.add_table(TableDescriptor::new(name, Schema::new(vec![]), true, Arc::new(|| {
            Box::new(FixedRowsProvider { blocks: vec![] })
        }))).unwrap();
    }
    let ctx = test_context(catalog);
    let mut scan = factory::system_scan(&ctx, SystemTableKind::Tables);
    let mut count = 0;
    while scan.get_next_row().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 6);
}
