//! Page ↔ chunk arithmetic.
//!
//! Pages are grouped into chunks of `pages_per_chunk` so that a single page
//! costs one store read while a full scan costs `ceil(pages / pages_per_chunk)`
//! keys instead of one key per page. Larger chunks mean fewer keys and more
//! over-fetch on single-page reads; smaller chunks the opposite.

use crate::error::{Error, Result};

/// Nominal page range covered by one chunk.
///
/// `page_index_end` is always `page_index_start + pages_per_chunk - 1`, even
/// for the final chunk; callers slicing real data clamp it themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_index: usize,
    pub page_index_start: usize,
    pub page_index_end: usize,
}

/// Address of a page inside the chunked layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub chunk_index: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    pages_per_chunk: usize,
}

impl Chunker {
    pub fn new(pages_per_chunk: usize) -> Result<Self> {
        if pages_per_chunk == 0 {
            return Err(Error::invalid("pages_per_chunk must be positive"));
        }
        Ok(Self { pages_per_chunk })
    }

    pub fn pages_per_chunk(&self) -> usize {
        self.pages_per_chunk
    }

    /// Number of chunks needed for `page_total` pages.
    pub fn count(&self, page_total: usize) -> usize {
        page_total.div_ceil(self.pages_per_chunk)
    }

    /// Chunk boundaries for `page_total` pages, ascending. Recomputed on every
    /// call.
    pub fn chunks(&self, page_total: usize) -> Chunks {
        Chunks {
            pages_per_chunk: self.pages_per_chunk,
            next: 0,
            count: self.count(page_total),
        }
    }

    /// Locates a zero-based global page index.
    pub fn locate(&self, page_index: usize) -> Location {
        Location {
            chunk_index: page_index / self.pages_per_chunk,
            offset: page_index % self.pages_per_chunk,
        }
    }
}

/// Iterator returned by [`Chunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks {
    pages_per_chunk: usize,
    next: usize,
    count: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next >= self.count {
            return None;
        }
        let chunk_index = self.next;
        self.next += 1;

        let page_index_start = chunk_index * self.pages_per_chunk;
        Some(Chunk {
            chunk_index,
            page_index_start,
            page_index_end: page_index_start + self.pages_per_chunk - 1,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}
