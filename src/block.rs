//! `Block`: a fixed-capacity, append-only row container, and `BlockManager`,
//! the pool that allocates and releases them (spec §4.1).
//!
//! Values are stored in a flat arena in row-major, schema order; a row
//! directory of offsets marks where each row starts. Capacity is tracked in
//! estimated bytes rather than a literal packed byte layout (`Value` is a
//! Rust enum, not a byte blob) — this preserves the contract that appends
//! past capacity are refused and that the caller must retry on a fresh
//! block (Testable property 10), without attempting to mimic the C
//! implementation's on-disk-style packing.

use crate::value::{Date, Time, Timestamp, Value};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block manager exhausted its process-wide budget of {0} blocks")]
    BudgetExceeded(usize),
}

/// Default block capacity: 2 MiB, within spec's "typical 1-4 MiB" range.
pub const DEFAULT_BLOCK_CAPACITY_BYTES: usize = 2 * 1024 * 1024;

fn value_size(v: &Value) -> usize {
    match v {
        Value::Null => 1,
        Value::Bool(_) => 2,
        Value::Int(_) => 9,
        Value::Real(_) => 9,
        Value::String(s) => 9 + s.len(),
        Value::Date(_) => 5,
        Value::Time(_) => 9,
        Value::Timestamp(_) => 13,
    }
}

/// An append-only, fixed-capacity container of rows.
#[derive(Debug)]
pub struct Block {
    capacity_bytes: usize,
    used_bytes: usize,
    arena: Vec<Value>,
    /// `row_ends[i]` is the exclusive end offset (into `arena`) of row `i`.
    row_ends: Vec<usize>,
    next_block_follows: bool,
    end_of_stream: bool,
}

impl Block {
    pub fn new(capacity_bytes: usize) -> Self {
        Block {
            capacity_bytes,
            used_bytes: 0,
            arena: Vec::new(),
            row_ends: Vec::new(),
            next_block_follows: false,
            end_of_stream: false,
        }
    }

    fn row_start(&self, row_idx: usize) -> usize {
        if row_idx == 0 {
            0
        } else {
            self.row_ends[row_idx - 1]
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_ends.len()
    }

    pub fn row(&self, idx: usize) -> &[Value] {
        &self.arena[self.row_start(idx)..self.row_ends[idx]]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        (0..self.row_count()).map(move |i| self.row(i))
    }

    /// Appends a value of any kind. Returns `false` (without mutating
    /// anything) if the value would overflow the block's capacity.
    pub fn add_value(&mut self, value: Value) -> bool {
        let size = value_size(&value);
        if self.used_bytes + size > self.capacity_bytes && !self.arena.is_empty() {
            return false;
        }
        self.used_bytes += size;
        self.arena.push(value);
        true
    }

    pub fn add_int(&mut self, num: i64, is_null: bool) -> bool {
        self.add_value(if is_null { Value::Null } else { Value::Int(num) })
    }

    pub fn add_real(&mut self, num: f64, is_null: bool) -> bool {
        self.add_value(if is_null { Value::Null } else { Value::Real(num) })
    }

    pub fn add_string(&mut self, s: &str, is_null: bool) -> bool {
        self.add_value(if is_null {
            Value::Null
        } else {
            Value::String(s.to_string())
        })
    }

    pub fn add_bool(&mut self, b: bool, is_null: bool) -> bool {
        self.add_value(if is_null { Value::Null } else { Value::Bool(b) })
    }

    pub fn add_date(&mut self, date: Date, is_null: bool) -> bool {
        self.add_value(if is_null { Value::Null } else { Value::Date(date) })
    }

    pub fn add_time(&mut self, time: Time, is_null: bool) -> bool {
        self.add_value(if is_null { Value::Null } else { Value::Time(time) })
    }

    pub fn add_timestamp(&mut self, ts: Timestamp, is_null: bool) -> bool {
        self.add_value(if is_null {
            Value::Null
        } else {
            Value::Timestamp(ts)
        })
    }

    /// Closes the current row. No-op on an empty block, or when the current
    /// row has already been closed (no cells appended since).
    pub fn next_row(&mut self) {
        if self.arena.is_empty() {
            return;
        }
        if self.row_ends.last() == Some(&self.arena.len()) {
            return;
        }
        self.row_ends.push(self.arena.len());
    }

    pub fn mark_next_block(&mut self) {
        self.next_block_follows = true;
    }

    pub fn end_blocks(&mut self) {
        self.end_of_stream = true;
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn has_next_block(&self) -> bool {
        self.next_block_follows
    }

    fn reset(&mut self) {
        self.arena.clear();
        self.row_ends.clear();
        self.used_bytes = 0;
        self.next_block_follows = false;
        self.end_of_stream = false;
    }
}

/// Owns the pool of blocks for one query execution. `create_block` hands
/// out a fresh (or recycled) block; `release` returns it to the pool.
pub struct BlockManager {
    capacity_bytes: usize,
    budget_blocks: Option<usize>,
    outstanding: usize,
    free: Vec<Block>,
}

impl BlockManager {
    pub fn new(capacity_bytes: usize) -> Self {
        BlockManager {
            capacity_bytes,
            budget_blocks: None,
            outstanding: 0,
            free: Vec::new(),
        }
    }

    pub fn with_budget(capacity_bytes: usize, budget_blocks: usize) -> Self {
        BlockManager {
            capacity_bytes,
            budget_blocks: Some(budget_blocks),
            outstanding: 0,
            free: Vec::new(),
        }
    }

    pub fn create_block(&mut self) -> Result<Block, BlockError> {
        if let Some(budget) = self.budget_blocks {
            if self.outstanding >= budget {
                return Err(BlockError::BudgetExceeded(budget));
            }
        }
        self.outstanding += 1;
        match self.free.pop() {
            Some(mut b) => {
                b.reset();
                Ok(b)
            }
            None => {
                log::debug!("BlockManager: allocating new block ({} bytes)", self.capacity_bytes);
                Ok(Block::new(self.capacity_bytes))
            }
        }
    }

    pub fn release(&mut self, block: Block) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(block);
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_row_noop_on_empty_block() {
        let mut b = Block::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        b.next_row();
        assert_eq!(b.row_count(), 0);
    }

    #[test]
    fn rows_preserve_insertion_order() {
        let mut b = Block::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        for i in 0..3 {
            b.add_int(i, false);
            b.next_row();
        }
        assert_eq!(b.row_count(), 3);
        assert_eq!(b.row(0), &[Value::Int(0)]);
        assert_eq!(b.row(2), &[Value::Int(2)]);
    }

    #[test]
    fn refusal_protocol_retry_on_fresh_block_succeeds() {
        let mut b = Block::new(16);
        assert!(b.add_int(1, false));
        // Second int (9 bytes) pushes used past 16: refused.
        let refused = !b.add_int(2, false);
        assert!(refused);
        let mut fresh = Block::new(16);
        assert!(fresh.add_int(2, false));
    }

    #[test]
    fn block_manager_recycles_released_blocks() {
        let mut mgr = BlockManager::new(DEFAULT_BLOCK_CAPACITY_BYTES);
        let mut b = mgr.create_block().unwrap();
        b.add_int(1, false);
        b.next_row();
        mgr.release(b);
        let recycled = mgr.create_block().unwrap();
        assert_eq!(recycled.row_count(), 0);
    }

    #[test]
    fn block_manager_budget_exceeded() {
        let mut mgr = BlockManager::with_budget(DEFAULT_BLOCK_CAPACITY_BYTES, 1);
        let _b1 = mgr.create_block().unwrap();
        assert!(mgr.create_block().is_err());
    }
}
