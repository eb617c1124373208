//! Double-buffered block storage for the exchange loop
//!
//! Each direction owns a [`BlockPair`]: two fixed-length [`AudioBlock`]s and
//! a one-bit index selecting the block the processing loop currently targets.
//!
//! # Ownership
//!
//! Every block carries a [`SlotOwner`] tag. A block becomes
//! [`SlotOwner::Hardware`] when it is submitted to the device, and returns to
//! [`SlotOwner::Processor`] when the processing loop passes that direction's
//! readiness wait on the following iteration. At most one block of a pair is
//! hardware-owned at any time, and it is never the block being processed.
//!
//! ```text
//!            submit()                      readiness consumed
//! Processor ──────────► Hardware ────────────────────────────► Processor
//! ```

use crate::types::{Direction, Sample};

/// Which side of the exchange currently owns a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOwner {
    /// Handed to the device; the processing loop must not touch it
    Hardware,
    /// Available to the processing loop
    Processor,
}

/// A fixed-length interleaved PCM block
#[derive(Debug)]
pub struct AudioBlock {
    samples: Box<[Sample]>,
    owner: SlotOwner,
}

impl AudioBlock {
    /// Allocate a zeroed block of `len` samples
    pub fn zeroed(len: usize) -> Self {
        Self {
            samples: vec![0; len].into_boxed_slice(),
            owner: SlotOwner::Processor,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn owner(&self) -> SlotOwner {
        self.owner
    }

    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    fn clear(&mut self) {
        self.samples.fill(0);
    }
}

/// Two blocks plus the index the processing loop targets
#[derive(Debug)]
pub struct BlockPair {
    blocks: [AudioBlock; 2],
    index: usize,
}

impl BlockPair {
    pub fn new(block_len: usize) -> Self {
        Self {
            blocks: [AudioBlock::zeroed(block_len), AudioBlock::zeroed(block_len)],
            index: 0,
        }
    }

    /// Index (0/1) of the block the processing loop targets
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn block_len(&self) -> usize {
        self.blocks[0].len()
    }

    pub fn block(&self, index: usize) -> &AudioBlock {
        &self.blocks[index & 1]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut AudioBlock {
        &mut self.blocks[index & 1]
    }

    /// The block the processing loop targets this iteration
    pub fn current(&self) -> &AudioBlock {
        &self.blocks[self.index]
    }

    pub fn current_mut(&mut self) -> &mut AudioBlock {
        &mut self.blocks[self.index]
    }

    /// Number of blocks currently handed to the device
    pub fn hardware_owned(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.owner == SlotOwner::Hardware)
            .count()
    }

    /// Mark the current block as handed to the device
    pub fn mark_submitted(&mut self) {
        debug_assert_eq!(
            self.blocks[self.index].owner,
            SlotOwner::Processor,
            "block submitted while the device still holds it"
        );
        debug_assert_eq!(
            self.blocks[self.index ^ 1].owner,
            SlotOwner::Processor,
            "both blocks of a pair handed to hardware"
        );
        self.blocks[self.index].owner = SlotOwner::Hardware;
    }

    /// Return the block submitted on the previous iteration to the processor
    ///
    /// Called once the device has signalled it is done with a buffer. Returns
    /// whether that block was hardware-owned; it is not on the first iteration
    /// after a reset, when the signal came from priming.
    pub fn reclaim(&mut self) -> bool {
        let previous = &mut self.blocks[self.index ^ 1];
        let was_hardware = previous.owner == SlotOwner::Hardware;
        previous.owner = SlotOwner::Processor;
        was_hardware
    }

    /// Advance to the alternate block
    #[inline]
    pub fn flip(&mut self) {
        self.index ^= 1;
    }

    /// Zero both blocks and return them to the processor
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.clear();
            block.owner = SlotOwner::Processor;
        }
    }
}

/// Owns the input and output block pairs of a session
///
/// The input pair is absent when the session has no input channels.
#[derive(Debug)]
pub struct BufferStore {
    input: Option<BlockPair>,
    output: BlockPair,
}

impl BufferStore {
    /// Allocate zeroed pairs sized `block_frames × channels` per direction
    pub fn new(block_frames: usize, input_channels: u32, output_channels: u32) -> Self {
        let input = (input_channels > 0)
            .then(|| BlockPair::new(block_frames * input_channels as usize));
        let output = BlockPair::new(block_frames * output_channels as usize);

        log::debug!(
            "BufferStore allocated: input={} samples, output={} samples (x2)",
            input.as_ref().map_or(0, BlockPair::block_len),
            output.block_len()
        );

        Self { input, output }
    }

    pub fn pair(&self, direction: Direction) -> Option<&BlockPair> {
        match direction {
            Direction::Input => self.input.as_ref(),
            Direction::Output => Some(&self.output),
        }
    }

    pub fn pair_mut(&mut self, direction: Direction) -> Option<&mut BlockPair> {
        match direction {
            Direction::Input => self.input.as_mut(),
            Direction::Output => Some(&mut self.output),
        }
    }

    /// Mutable view of one block, or None when the direction is disabled
    pub fn block_for(&mut self, direction: Direction, index: usize) -> Option<&mut [Sample]> {
        self.pair_mut(direction)
            .map(|pair| pair.block_mut(index).samples_mut())
    }

    pub fn output(&self) -> &BlockPair {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut BlockPair {
        &mut self.output
    }

    pub fn input_mut(&mut self) -> Option<&mut BlockPair> {
        self.input.as_mut()
    }

    /// Split borrow of the current input (empty when disabled) and output blocks
    ///
    /// Both blocks must be processor-owned.
    pub fn current_blocks(&mut self) -> (&[Sample], &mut [Sample]) {
        let input: &[Sample] = match &self.input {
            Some(pair) => {
                debug_assert_eq!(pair.current().owner(), SlotOwner::Processor);
                pair.current().samples()
            }
            None => &[],
        };
        debug_assert_eq!(self.output.current().owner(), SlotOwner::Processor);
        (input, self.output.current_mut().samples_mut())
    }

    /// Zero every block and return all of them to the processor
    pub fn reset(&mut self) {
        if let Some(input) = &mut self.input {
            input.reset();
        }
        self.output.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_sizes() {
        let mut store = BufferStore::new(1024, 1, 2);
        assert_eq!(store.output().block_len(), 2048);
        assert_eq!(store.block_for(Direction::Input, 0).unwrap().len(), 1024);
        assert_eq!(store.block_for(Direction::Output, 1).unwrap().len(), 2048);
    }

    #[test]
    fn test_disabled_input_has_no_pair() {
        let mut store = BufferStore::new(256, 0, 2);
        assert!(store.pair(Direction::Input).is_none());
        assert!(store.block_for(Direction::Input, 0).is_none());

        let (input, output) = store.current_blocks();
        assert!(input.is_empty());
        assert_eq!(output.len(), 512);
    }

    #[test]
    fn test_submit_reclaim_cycle() {
        let mut pair = BlockPair::new(8);
        assert_eq!(pair.hardware_owned(), 0);

        // Primed first iteration: nothing to give back
        assert!(!pair.reclaim());
        pair.mark_submitted();
        assert_eq!(pair.block(0).owner(), SlotOwner::Hardware);
        assert_eq!(pair.hardware_owned(), 1);

        pair.flip();
        assert_eq!(pair.index(), 1);
        assert_eq!(pair.current().owner(), SlotOwner::Processor);

        assert!(pair.reclaim());
        pair.mark_submitted();
        assert_eq!(pair.block(0).owner(), SlotOwner::Processor);
        assert_eq!(pair.block(1).owner(), SlotOwner::Hardware);
        assert_eq!(pair.hardware_owned(), 1);
    }

    #[test]
    fn test_reclaim_leaves_current_block_alone() {
        let mut pair = BlockPair::new(8);
        pair.mark_submitted();

        // Without a flip the previous slot is the idle one
        assert!(!pair.reclaim());
        assert_eq!(pair.current().owner(), SlotOwner::Hardware);
        assert_eq!(pair.hardware_owned(), 1);
    }

    #[test]
    fn test_loop_sequence_keeps_one_block_in_hardware() {
        let mut store = BufferStore::new(16, 1, 2);

        for iteration in 0..6 {
            let input = store.input_mut().unwrap();
            assert_eq!(input.reclaim(), iteration > 0);

            let _ = store.current_blocks();

            assert_eq!(store.output_mut().reclaim(), iteration > 0);
            store.output_mut().mark_submitted();
            store.input_mut().unwrap().mark_submitted();

            assert_eq!(store.output().hardware_owned(), 1);
            assert_eq!(store.pair(Direction::Input).unwrap().hardware_owned(), 1);

            store.output_mut().flip();
            store.input_mut().unwrap().flip();
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "block submitted while the device still holds it")]
    fn test_missed_flip_is_caught() {
        let mut pair = BlockPair::new(8);
        pair.mark_submitted();
        pair.reclaim();
        pair.mark_submitted();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_processing_held_block_is_caught() {
        let mut store = BufferStore::new(4, 0, 1);
        store.output_mut().mark_submitted();
        store.output_mut().flip();
        store.output_mut().flip();
        let _ = store.current_blocks();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "both blocks of a pair handed to hardware")]
    fn test_double_hardware_ownership_is_caught() {
        let mut pair = BlockPair::new(8);
        pair.mark_submitted();
        pair.flip();
        pair.mark_submitted();
    }

    #[test]
    fn test_reset_zeroes_and_reclaims() {
        let mut store = BufferStore::new(4, 1, 1);
        store.block_for(Direction::Output, 0).unwrap().fill(7);
        store.output_mut().mark_submitted();

        store.reset();

        assert!(store.output().block(0).samples().iter().all(|&s| s == 0));
        assert_eq!(store.output().hardware_owned(), 0);
    }
}
