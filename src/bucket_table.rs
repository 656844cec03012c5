//! BucketTable: one `(head, count)` descriptor per bucket.

use crate::entry_list::Position;

/// Bucket count chosen by the first insertion into an empty table.
pub(crate) const INITIAL_BUCKETS: usize = 4;

/// Descriptor of one bucket's run inside the shared entry list.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Bucket {
    /// First entry of the run; `None` iff `count == 0`.
    pub(crate) head: Option<Position>,
    pub(crate) count: usize,
}

impl Bucket {
    const EMPTY: Bucket = Bucket {
        head: None,
        count: 0,
    };

    /// Records `pos` as the new first entry of the run.
    pub(crate) fn push_head(&mut self, pos: Position) {
        self.head = Some(pos);
        self.count += 1;
    }

    /// Forgets `pos`, which must belong to this run. `next` is the entry
    /// following `pos` in the list, read before `pos` is unlinked.
    pub(crate) fn forget(&mut self, pos: Position, next: Option<Position>) {
        debug_assert!(self.count > 0);
        self.count -= 1;
        if self.count == 0 {
            self.head = None;
        } else if self.head == Some(pos) {
            self.head = next;
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct BucketTable {
    buckets: Vec<Bucket>,
}

impl BucketTable {
    pub(crate) fn new() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Size the table should grow to: `INITIAL_BUCKETS` when unallocated,
    /// twice the current size otherwise.
    pub(crate) fn grown_len(&self) -> usize {
        if self.buckets.is_empty() {
            INITIAL_BUCKETS
        } else {
            self.buckets.len() * 2
        }
    }

    /// Bucket index for `hash`. The table must be allocated.
    #[inline]
    pub(crate) fn index_of(&self, hash: u64) -> usize {
        debug_assert!(!self.buckets.is_empty(), "bucket table not allocated");
        (hash % self.buckets.len() as u64) as usize
    }

    pub(crate) fn bucket_for(&self, hash: u64) -> &Bucket {
        &self.buckets[self.index_of(hash)]
    }

    pub(crate) fn bucket_for_mut(&mut self, hash: u64) -> &mut Bucket {
        let i = self.index_of(hash);
        &mut self.buckets[i]
    }

    /// Resizes to `len` descriptors, all empty.
    pub(crate) fn reset(&mut self, len: usize) {
        self.buckets.clear();
        self.buckets.resize(len, Bucket::EMPTY);
    }

    /// Frees the descriptor array; the table becomes unallocated.
    pub(crate) fn release(&mut self) {
        self.buckets = Vec::new();
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> core::slice::Iter<'_, Bucket> {
        self.buckets.iter()
    }
}
