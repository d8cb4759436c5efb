//! `BlockProducer`: the push-to-pull adapter described in spec §4.3.
//!
//! A reader callback runs on a dedicated worker thread, filling blocks
//! through a handle that mirrors `Block`'s typed appenders. Completed
//! blocks cross a bounded queue to the consumer thread; the queue is
//! guarded by one mutex and one condition variable, exactly as in
//! `examples/original_source/csvsqldb/block_producer.{h,cpp}`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::block::{Block, BlockManager};
use crate::block_provider::{BlockProvider, ProviderError};
use crate::value::{Date, Time, Timestamp};

/// High watermark: the producer blocks once the queue reaches this depth.
pub const HIGH_WATERMARK: usize = 10;
/// Low watermark: the producer resumes once the queue drains below this.
pub const LOW_WATERMARK: usize = 5;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProducerError(pub String);

/// Explicit producer lifecycle states (spec §4.14).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

struct SharedState {
    queue: VecDeque<Block>,
    error: Option<String>,
    done: bool,
}

struct Shared {
    mutex: Mutex<SharedState>,
    not_empty_or_full: Condvar,
}

/// Handle passed to the reader callback; offers the same typed append API
/// as `Block`, transparently rolling over to a fresh block on capacity
/// refusal.
pub struct ProducerHandle {
    shared: Arc<Shared>,
    manager: Arc<Mutex<BlockManager>>,
    block: Block,
}

impl ProducerHandle {
    fn roll_block(&mut self) {
        self.block.mark_next_block();
        let finished = std::mem::replace(
            &mut self.block,
            self.manager
                .lock()
                .unwrap()
                .create_block()
                .expect("block manager budget exceeded"),
        );
        let mut state = self.shared.mutex.lock().unwrap();
        state.queue.push_back(finished);
        self.shared.not_empty_or_full.notify_all();
        if state.queue.len() >= HIGH_WATERMARK {
            log::debug!("BlockProducer: queue at high watermark, backing off");
            state = self
                .shared
                .not_empty_or_full
                .wait_while(state, |s| s.queue.len() >= LOW_WATERMARK)
                .unwrap();
            log::debug!("BlockProducer: resumed below low watermark");
        }
        drop(state);
    }

    pub fn next_row(&mut self) {
        self.block.next_row();
    }

    pub fn add_int(&mut self, num: i64, is_null: bool) {
        if !self.block.add_int(num, is_null) {
            self.roll_block();
            self.block.add_int(num, is_null);
        }
    }

    pub fn add_real(&mut self, num: f64, is_null: bool) {
        if !self.block.add_real(num, is_null) {
            self.roll_block();
            self.block.add_real(num, is_null);
        }
    }

    pub fn add_string(&mut self, s: &str, is_null: bool) {
        if !self.block.add_string(s, is_null) {
            self.roll_block();
            self.block.add_string(s, is_null);
        }
    }

    pub fn add_bool(&mut self, b: bool, is_null: bool) {
        if !self.block.add_bool(b, is_null) {
            self.roll_block();
            self.block.add_bool(b, is_null);
        }
    }

    pub fn add_date(&mut self, date: Date, is_null: bool) {
        if !self.block.add_date(date, is_null) {
            self.roll_block();
            self.block.add_date(date, is_null);
        }
    }

    pub fn add_time(&mut self, time: Time, is_null: bool) {
        if !self.block.add_time(time, is_null) {
            self.roll_block();
            self.block.add_time(time, is_null);
        }
    }

    pub fn add_timestamp(&mut self, ts: Timestamp, is_null: bool) {
        if !self.block.add_timestamp(ts, is_null) {
            self.roll_block();
            self.block.add_timestamp(ts, is_null);
        }
    }
}

/// Background-thread push-side counterpart to a pull consumer.
pub struct BlockProducer {
    shared: Arc<Shared>,
    manager: Arc<Mutex<BlockManager>>,
    worker: Option<JoinHandle<()>>,
    started: bool,
}

impl BlockProducer {
    pub fn new(manager: BlockManager) -> Self {
        BlockProducer {
            shared: Arc::new(Shared {
                mutex: Mutex::new(SharedState {
                    queue: VecDeque::new(),
                    error: None,
                    done: false,
                }),
                not_empty_or_full: Condvar::new(),
            }),
            manager: Arc::new(Mutex::new(manager)),
            worker: None,
            started: false,
        }
    }

    /// Spawns the worker thread, which invokes `reader` with a handle
    /// mirroring `Block`'s append API. The reader returns `Err(message)` to
    /// signal a failure that the next `get_next_block` call will propagate.
    pub fn start<F>(&mut self, reader: F)
    where
        F: FnOnce(&mut ProducerHandle) -> Result<(), String> + Send + 'static,
    {
        debug_assert!(!self.started, "BlockProducer::start called twice");
        self.started = true;
        let shared = Arc::clone(&self.shared);
        let manager = Arc::clone(&self.manager);
        let first_block = manager
            .lock()
            .unwrap()
            .create_block()
            .expect("block manager budget exceeded");
        self.worker = Some(std::thread::spawn(move || {
            let mut handle = ProducerHandle {
                shared: Arc::clone(&shared),
                manager: Arc::clone(&manager),
                block: first_block,
            };
            let result = reader(&mut handle);
            let mut state = shared.mutex.lock().unwrap();
            match result {
                Ok(()) => {
                    handle.block.end_blocks();
                    state.queue.push_back(handle.block);
                    log::debug!("BlockProducer: reader completed");
                }
                Err(msg) => {
                    state.queue.push_back(handle.block);
                    log::warn!("BlockProducer: reader failed: {msg}");
                    state.error = Some(msg);
                }
            }
            state.done = true;
            shared.not_empty_or_full.notify_all();
        }));
    }

    pub fn state(&self) -> ProducerState {
        if !self.started {
            return ProducerState::Idle;
        }
        let state = self.shared.mutex.lock().unwrap();
        if state.error.is_some() {
            ProducerState::Failed
        } else if state.done {
            ProducerState::Completed
        } else {
            ProducerState::Running
        }
    }
}

impl BlockProvider for BlockProducer {
    fn get_next_block(&mut self) -> Result<Option<Block>, ProviderError> {
        let mut state = self.shared.mutex.lock().unwrap();
        loop {
            if let Some(block) = state.queue.pop_front() {
                self.shared.not_empty_or_full.notify_all();
                return Ok(Some(block));
            }
            if let Some(err) = state.error.take() {
                return Err(ProviderError::Producer(ProducerError(err)));
            }
            if state.done {
                return Ok(None);
            }
            state = self.shared.not_empty_or_full.wait(state).unwrap();
        }
    }
}

impl Drop for BlockProducer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let mut state = self.shared.mutex.lock().unwrap();
        let mut manager = self.manager.lock().unwrap();
        while let Some(block) = state.queue.pop_front() {
            manager.release(block);
        }
    }
}
