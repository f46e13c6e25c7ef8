//! Two-phase bump allocator packing several objects into one memory block.
//!
//! The first phase ([`DataBank`]) only accounts sizes. Binding the bank to a
//! block of the accounted size yields a [`BoundBank`] that hands out the
//! actual sub-allocations. Fixed data grows forward from the start of the
//! region while strings grow backward from its end, each followed by a null
//! terminator, so that fixed records stay contiguous and aligned.
//!
//! Sub-allocations are returned as byte ranges relative to the bound block.

use std::ops::Range;

/// Reserve phase: accumulates the byte count of everything to be allocated.
#[derive(Debug, Default, Clone)]
pub struct DataBank {
    size: usize,
}

impl DataBank {
    /// Creates an empty bank ready for reservations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts `size` bytes of opaque data.
    pub fn reserve_data(&mut self, size: usize) {
        self.size += size;
    }

    /// Accounts a string of `size` bytes plus its null terminator.
    pub fn reserve_str(&mut self, size: usize) {
        self.size += size + 1;
    }

    /// Returns the total number of bytes reserved so far.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Switches to the commit phase over the whole `block`.
    ///
    /// # Panics
    /// Panics if `block` is shorter than the reserved size.
    pub fn bind(self, block: &mut [u8]) -> BoundBank<'_> {
        self.bind_at(block, 0)
    }

    /// Switches to the commit phase over `block[start..start + size()]`.
    ///
    /// # Panics
    /// Panics if the reserved region does not fit into `block`.
    pub fn bind_at(self, block: &mut [u8], start: usize) -> BoundBank<'_> {
        let end = start + self.size;
        assert!(
            end <= block.len(),
            "data bank region {}..{} exceeds block of {} bytes",
            start,
            end,
            block.len()
        );
        BoundBank {
            block,
            head: start,
            tail: end,
        }
    }
}

/// Commit phase: carves sub-allocations out of a bound block.
#[derive(Debug)]
pub struct BoundBank<'a> {
    block: &'a mut [u8],
    /// Forward cursor for fixed data
    head: usize,
    /// Backward cursor for strings
    tail: usize,
}

impl<'a> BoundBank<'a> {
    /// Takes the next `size` bytes from the forward cursor.
    ///
    /// # Panics
    /// Panics if the request exceeds what was reserved.
    pub fn alloc_data(&mut self, size: usize) -> Range<usize> {
        assert!(
            size <= self.remaining(),
            "data bank overflow: {} bytes requested, {} left",
            size,
            self.remaining()
        );
        let start = self.head;
        self.head += size;
        start..self.head
    }

    /// Copies `src` plus a null terminator to the backward cursor and returns
    /// the range of the copied string (terminator excluded).
    ///
    /// # Panics
    /// Panics if the request exceeds what was reserved.
    pub fn alloc_str(&mut self, src: &[u8]) -> Range<usize> {
        let needed = src.len() + 1;
        assert!(
            needed <= self.remaining(),
            "data bank overflow: {} bytes requested, {} left",
            needed,
            self.remaining()
        );
        self.tail -= 1;
        self.block[self.tail] = 0;
        self.tail -= src.len();
        let range = self.tail..self.tail + src.len();
        self.block[range.clone()].copy_from_slice(src);
        range
    }

    /// Bytes reserved but not handed out yet.
    pub fn remaining(&self) -> usize {
        self.tail - self.head
    }

    /// Ends the commit phase.
    ///
    /// # Panics
    /// Panics if the cursors did not meet, i.e. the commit phase did not
    /// consume exactly what the reserve phase accounted.
    pub fn finish(self) {
        assert_eq!(
            self.remaining(),
            0,
            "data bank was not fully consumed: reserve and commit phases diverged"
        );
    }
}
