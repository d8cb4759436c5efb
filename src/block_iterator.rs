//! The `BlockIterator` family (spec §4.2): consumers of a `BlockProvider`
//! that yield rows lazily, in increasingly specialised flavours.
//!
//! Every variant owns the `Row` buffer it hands back, so the "valid until
//! the next call" contract from spec §3 falls directly out of Rust's borrow
//! checker: the returned `&Row` borrows `&self`, and a second call requires
//! `&mut self` again. This mirrors the teacher's `TempTableStreamingIterator`
//! (`temp_table.rs`), which clones each item into an owned slot rather than
//! threading raw lifetimes through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::aggregate::AggregateFunction;
use crate::block::{Block, BlockManager};
use crate::block_provider::{BlockProvider, ProviderError};
use crate::value::Value;

/// A fully materialised row. See module docs for why this is owned rather
/// than a borrowed `[&Value]`.
pub type Row = Vec<Value>;

fn row_from_slice(slice: &[Value]) -> Row {
    slice.to_vec()
}

/// Streams rows from a `BlockProvider`. Releases the previous block back to
/// the manager as soon as the next one is pulled, bounding memory to one
/// (or two, mid-transition) live block.
pub struct BlockIterator {
    provider: Box<dyn BlockProvider + Send>,
    manager: Arc<Mutex<BlockManager>>,
    current: Option<Block>,
    row_idx: usize,
    row: Row,
    ended: bool,
}

impl BlockIterator {
    pub fn new(provider: Box<dyn BlockProvider + Send>, manager: Arc<Mutex<BlockManager>>) -> Self {
        BlockIterator {
            provider,
            manager,
            current: None,
            row_idx: 0,
            row: Row::new(),
            ended: false,
        }
    }

    pub fn get_next_row(&mut self) -> Result<Option<&Row>, ProviderError> {
        if self.ended {
            return Ok(None);
        }
        loop {
            if let Some(block) = &self.current {
                if self.row_idx < block.row_count() {
                    self.row = row_from_slice(block.row(self.row_idx));
                    self.row_idx += 1;
                    return Ok(Some(&self.row));
                }
            }
            if let Some(old) = self.current.take() {
                self.manager.lock().unwrap().release(old);
            }
            match self.provider.get_next_block()? {
                Some(block) => {
                    self.row_idx = 0;
                    self.current = Some(block);
                }
                None => {
                    self.ended = true;
                    return Ok(None);
                }
            }
        }
    }
}

/// Additionally retains every consumed block, supporting `rewind()`. Used
/// as the right side of a cross join; memory grows with the rhs size, a
/// deliberate tradeoff (spec §4.2).
pub struct CachingBlockIterator {
    provider: Box<dyn BlockProvider + Send>,
    manager: Arc<Mutex<BlockManager>>,
    retained: Vec<Block>,
    drained_source: bool,
    block_idx: usize,
    row_idx: usize,
    row: Row,
}

impl CachingBlockIterator {
    pub fn new(provider: Box<dyn BlockProvider + Send>, manager: Arc<Mutex<BlockManager>>) -> Self {
        CachingBlockIterator {
            provider,
            manager,
            retained: Vec::new(),
            drained_source: false,
            block_idx: 0,
            row_idx: 0,
            row: Row::new(),
        }
    }

    pub fn get_next_row(&mut self) -> Result<Option<&Row>, ProviderError> {
        loop {
            if self.block_idx < self.retained.len() {
                let block = &self.retained[self.block_idx];
                if self.row_idx < block.row_count() {
                    self.row = row_from_slice(block.row(self.row_idx));
                    self.row_idx += 1;
                    return Ok(Some(&self.row));
                }
                self.block_idx += 1;
                self.row_idx = 0;
                continue;
            }
            if self.drained_source {
                return Ok(None);
            }
            match self.provider.get_next_block()? {
                Some(block) => self.retained.push(block),
                None => self.drained_source = true,
            }
        }
    }

    /// Resets iteration to the first retained row, without releasing any
    /// retained block.
    pub fn rewind(&mut self) {
        self.block_idx = 0;
        self.row_idx = 0;
    }
}

impl Drop for CachingBlockIterator {
    fn drop(&mut self) {
        let mut mgr = self.manager.lock().unwrap();
        for block in self.retained.drain(..) {
            mgr.release(block);
        }
    }
}

/// Eagerly drains its source on first access, partitioning rows into
/// buckets keyed by the value at `key_col`. `set_context_for_key_value`
/// positions iteration over the matching bucket; `get_next_key_value_row`
/// yields rows from it. Hashing and equality both route through `Value`'s
/// own `Hash`/`Eq`, so Testable property 12 carries over directly.
pub struct HashingBlockIterator {
    provider: Box<dyn BlockProvider + Send>,
    manager: Arc<Mutex<BlockManager>>,
    key_col: usize,
    retained: Vec<Block>,
    buckets: HashMap<Value, Vec<(usize, usize)>>,
    drained: bool,
    current_bucket: Vec<(usize, usize)>,
    cursor: usize,
    row: Row,
}

impl HashingBlockIterator {
    pub fn new(
        provider: Box<dyn BlockProvider + Send>,
        manager: Arc<Mutex<BlockManager>>,
        key_col: usize,
    ) -> Self {
        HashingBlockIterator {
            provider,
            manager,
            key_col,
            retained: Vec::new(),
            buckets: HashMap::new(),
            drained: false,
            current_bucket: Vec::new(),
            cursor: 0,
            row: Row::new(),
        }
    }

    fn drain_source(&mut self) -> Result<(), ProviderError> {
        if self.drained {
            return Ok(());
        }
        while let Some(block) = self.provider.get_next_block()? {
            let block_idx = self.retained.len();
            for row_idx in 0..block.row_count() {
                let key = block.row(row_idx)[self.key_col].clone();
                // NULL keys never match (spec §4.10): they are never indexed.
                if !key.is_null() {
                    self.buckets.entry(key).or_default().push((block_idx, row_idx));
                }
            }
            self.retained.push(block);
        }
        self.drained = true;
        Ok(())
    }

    pub fn set_context_for_key_value(&mut self, key: Value) -> Result<(), ProviderError> {
        self.drain_source()?;
        self.current_bucket = self.buckets.get(&key).cloned().unwrap_or_default();
        self.cursor = 0;
        Ok(())
    }

    pub fn get_next_key_value_row(&mut self) -> Option<&Row> {
        if self.cursor >= self.current_bucket.len() {
            return None;
        }
        let (block_idx, row_idx) = self.current_bucket[self.cursor];
        self.cursor += 1;
        self.row = row_from_slice(self.retained[block_idx].row(row_idx));
        Some(&self.row)
    }

    /// Releases all retained blocks, e.g. once the lhs of a hash join is
    /// exhausted.
    pub fn reset(&mut self) {
        let mut mgr = self.manager.lock().unwrap();
        for block in self.retained.drain(..) {
            mgr.release(block);
        }
        self.buckets.clear();
        self.current_bucket.clear();
        self.cursor = 0;
        self.drained = false;
    }
}

impl Drop for HashingBlockIterator {
    fn drop(&mut self) {
        self.reset();
    }
}

/// One discovered GROUP BY group: its composite key, the non-grouping
/// columns' aggregate functions (in output-column order), and a
/// passthrough for the grouping columns.
struct Group {
    funcs: Vec<Box<dyn AggregateFunction>>,
}

/// Eagerly drains its source, partitions rows by a composite key built from
/// `grouping_indices`, runs `output_funcs` (cloned per group) over the
/// columns named by `output_columns`, and emits one row per group in
/// first-observation order (spec §4.2, Testable property 4).
///
/// NULL group keys are treated as equal to NULL for grouping purposes, per
/// the Open Question resolved in DESIGN.md.
pub struct GroupingBlockIterator {
    emitted: Vec<Row>,
    cursor: usize,
}

impl GroupingBlockIterator {
    pub fn build(
        provider: &mut (dyn BlockProvider + Send),
        manager: &Arc<Mutex<BlockManager>>,
        grouping_indices: &[usize],
        output_columns: &[usize],
        template_funcs: &[Box<dyn AggregateFunction>],
    ) -> Result<Self, ProviderError> {
        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut groups: HashMap<Vec<Value>, Group> = HashMap::new();

        let mut blocks: Vec<Block> = Vec::new();
        while let Some(block) = provider.get_next_block()? {
            blocks.push(block);
        }

        for block in &blocks {
            for row_idx in 0..block.row_count() {
                let row = block.row(row_idx);
                let key: Vec<Value> = grouping_indices.iter().map(|&i| row[i].clone()).collect();
                let group = groups.entry(key.clone()).or_insert_with(|| {
                    order.push(key.clone());
                    let mut funcs: Vec<Box<dyn AggregateFunction>> =
                        template_funcs.iter().map(|f| f.clone_box()).collect();
                    for f in &mut funcs {
                        f.init();
                    }
                    Group { funcs }
                });
                for (func, &col) in group.funcs.iter_mut().zip(output_columns.iter()) {
                    func.step(&row[col]).map_err(|e| {
                        ProviderError::Producer(crate::producer::ProducerError(e.to_string()))
                    })?;
                }
            }
        }

        {
            let mut mgr = manager.lock().unwrap();
            for block in blocks {
                mgr.release(block);
            }
        }

        let emitted = order
            .into_iter()
            .map(|key| {
                let group = groups.remove(&key).expect("group key was just recorded");
                group
                    .funcs
                    .iter()
                    .filter(|f| !f.suppress())
                    .map(|f| f.finalize())
                    .collect::<Row>()
            })
            .collect();

        Ok(GroupingBlockIterator { emitted, cursor: 0 })
    }

    pub fn get_next_row(&mut self) -> Option<&Row> {
        if self.cursor >= self.emitted.len() {
            return None;
        }
        let row = &self.emitted[self.cursor];
        self.cursor += 1;
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::DEFAULT_BLOCK_CAPACITY_BYTES;

    struct VecProvider {
        blocks: Vec<Block>,
    }
    impl BlockProvider for VecProvider {
        fn get_next_block(&mut self) -> Result<Option<Block>, ProviderError> {
            Ok(if self.blocks.is_empty() {
                None
            } else {
                Some(self.blocks.remove(0))
            })
        }
    }

    fn int_block(values: &[i64]) -> Block {
        let mut b = Block::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        for v in values {
            b.add_int(*v, false);
            b.next_row();
        }
        b
    }

    #[test]
    fn plain_iterator_streams_in_order() {
        let manager = Arc::new(Mutex::new(BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES)));
        let provider = VecProvider {
            blocks: vec![int_block(&[1, 2]), int_block(&[3])],
        };
        let mut it = BlockIterator::new(Box::new(provider), manager);
        let mut seen = vec![];
        while let Some(row) = it.get_next_row().unwrap() {
            seen.push(row[0].clone());
        }
        assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn caching_iterator_rewinds() {
        let manager = Arc::new(Mutex::new(BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES)));
        let provider = VecProvider {
            blocks: vec![int_block(&[1, 2])],
        };
        let mut it = CachingBlockIterator::new(Box::new(provider), manager);
        let mut first_pass = vec![];
        while let Some(row) = it.get_next_row().unwrap() {
            first_pass.push(row[0].clone());
        }
        it.rewind();
        let mut second_pass = vec![];
        while let Some(row) = it.get_next_row().unwrap() {
            second_pass.push(row[0].clone());
        }
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn hashing_iterator_buckets_by_key_and_skips_null() {
        let manager = Arc::new(Mutex::new(BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES)));
        let mut b = Block::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        for (k, v) in [(1i64, 10i64), (1, 11), (2, 20)] {
            b.add_int(k, false);
            b.add_int(v, false);
            b.next_row();
        }
        b.add_int(0, true);
        b.add_int(99, false);
        b.next_row();
        let provider = VecProvider { blocks: vec![b] };
        let mut it = HashingBlockIterator::new(Box::new(provider), manager, 0);
        it.set_context_for_key_value(Value::Int(1)).unwrap();
        let mut bucket = vec![];
        while let Some(row) = it.get_next_key_value_row() {
            bucket.push(row[1].clone());
        }
        assert_eq!(bucket, vec![Value::Int(10), Value::Int(11)]);

        it.set_context_for_key_value(Value::Null).unwrap();
        assert!(it.get_next_key_value_row().is_none());
    }
}
