//! Growable byte region with a read cursor.
//!
//! Bytes `[0, index)` have been handed out and may be discarded; bytes
//! `[index, len)` are pending. Growth prefers shifting the pending range down
//! over allocating, and a fully drained arena rewinds to offset 0 so its
//! capacity is reused by the next frame.

/// Initial arena capacity.
pub const DEFAULT_ARENA_CAPACITY: usize = 16 * 1024;

/// How the arena makes room for incoming bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Enough free capacity after the pending range already.
    InPlace,
    /// Shift the pending range to offset 0; no allocation.
    Compact,
    /// Allocate a new region of exactly this capacity.
    Reallocate(usize),
}

/// Decide how to fit `incoming` bytes into an arena of `capacity` holding
/// `len` bytes of which `index` are consumed.
pub fn plan_growth(capacity: usize, len: usize, index: usize, incoming: usize) -> Growth {
    let pending = len - index;
    if len + incoming <= capacity {
        Growth::InPlace
    } else if pending + incoming <= capacity {
        Growth::Compact
    } else {
        Growth::Reallocate(pending + incoming)
    }
}

#[derive(Debug)]
pub struct Arena {
    buf: Vec<u8>,
    index: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Read cursor.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Bytes not yet handed out.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.index
    }

    /// Rewind a fully drained arena to offset 0.
    pub fn reclaim(&mut self) {
        if self.index > 0 && self.index == self.buf.len() {
            self.buf.clear();
            self.index = 0;
        }
    }

    /// Make room for `incoming` more bytes after the pending range.
    pub fn reserve(&mut self, incoming: usize) {
        match plan_growth(self.buf.capacity(), self.buf.len(), self.index, incoming) {
            Growth::InPlace => {}
            Growth::Compact => {
                let pending = self.pending();
                self.buf.copy_within(self.index.., 0);
                self.buf.truncate(pending);
                self.index = 0;
            }
            Growth::Reallocate(capacity) => {
                let mut fresh = Vec::with_capacity(capacity);
                fresh.extend_from_slice(&self.buf[self.index..]);
                self.buf = fresh;
                self.index = 0;
            }
        }
    }

    /// Append `data` to the pending range.
    pub fn append(&mut self, data: &[u8]) {
        self.reserve(data.len());
        self.buf.extend_from_slice(data);
    }

    /// Append `n` zeroed bytes and return them for the caller to fill.
    pub fn extend_zeroed(&mut self, n: usize) -> &mut [u8] {
        self.reserve(n);
        let start = self.buf.len();
        self.buf.resize(start + n, 0);
        &mut self.buf[start..]
    }

    /// Drop bytes past `len`, undoing a failed [`extend_zeroed`](Self::extend_zeroed).
    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len.max(self.index));
    }

    /// Hand out the next `n` pending bytes and advance the cursor.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are pending.
    pub fn take(&mut self, n: usize) -> &[u8] {
        assert!(n <= self.pending(), "arena underflow: {n} > {}", self.pending());
        let start = self.index;
        self.index += n;
        &self.buf[start..start + n]
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
