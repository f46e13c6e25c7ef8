//! Transient bump arena backing a single decode operation.
//!
//! Strings are copied (with a null terminator) into shared chunks and handed
//! out as [`Bytes`] slices, so decoded definitions never alias the caller's
//! input buffer. Every allocation is charged against a byte limit; exceeding
//! it is reported as an allocation failure with the size that did not fit.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::ConstraintConfig;
use crate::constraint_def::DecodeError;

/// Bounded bump arena for decode results.
#[derive(Debug)]
pub struct Region {
    chunk: BytesMut,
    chunk_size: usize,
    used: usize,
    limit: usize,
}

impl Region {
    /// Creates a region without a byte limit.
    pub fn new() -> Self {
        Self::from_config(&ConstraintConfig::default())
    }

    /// Creates a region that refuses to grow beyond `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::new()
        }
    }

    /// Creates a region sized by configuration.
    pub fn from_config(config: &ConstraintConfig) -> Self {
        Self {
            chunk: BytesMut::new(),
            chunk_size: config.region_chunk_size.max(1),
            used: 0,
            limit: config.region_limit,
        }
    }

    /// Bytes charged so far.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Charges `size` bytes without storing anything; `what` names the object
    /// in the failure report.
    pub fn reserve(&mut self, size: usize, what: &'static str) -> Result<(), DecodeError> {
        match self.used.checked_add(size) {
            Some(total) if total <= self.limit => {
                self.used = total;
                Ok(())
            }
            _ => Err(DecodeError::Alloc { size, what }),
        }
    }

    /// Copies `src` into the region and returns the copy.
    pub fn alloc_str(&mut self, src: &[u8], what: &'static str) -> Result<Bytes, DecodeError> {
        let needed = src.len() + 1;
        self.reserve(needed, what)?;
        if self.chunk.capacity() - self.chunk.len() < needed {
            self.chunk = BytesMut::with_capacity(needed.max(self.chunk_size));
        }
        self.chunk.extend_from_slice(src);
        self.chunk.put_u8(0);
        let copy = self.chunk.split().freeze();
        Ok(copy.slice(..src.len()))
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::new()
    }
}
