//! `BlockProvider`: a single-consumer source of `Block`s (spec §3).

use std::collections::VecDeque;

use crate::block::Block;
use crate::producer::ProducerError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("producer failed: {0}")]
    Producer(#[from] ProducerError),
}

/// Exposes a single operation: pull the next block, or `None` at
/// end-of-stream. Implementors are single-consumer.
pub trait BlockProvider {
    fn get_next_block(&mut self) -> Result<Option<Block>, ProviderError>;
}

/// A provider over already-materialised blocks, used when an operator
/// buffers its upstream into blocks synchronously (no background thread)
/// before handing them to a `BlockIterator` variant.
pub struct VecBlockProvider {
    blocks: VecDeque<Block>,
}

impl VecBlockProvider {
    pub fn new(blocks: Vec<Block>) -> Self {
        VecBlockProvider {
            blocks: blocks.into(),
        }
    }
}

impl BlockProvider for VecBlockProvider {
    fn get_next_block(&mut self) -> Result<Option<Block>, ProviderError> {
        Ok(self.blocks.pop_front())
    }
}
