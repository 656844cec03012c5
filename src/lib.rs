//! run-hashmap: a single-threaded hash map whose buckets are contiguous
//! runs of one shared, doubly-linked entry sequence.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: chain buckets without a list per bucket. All entries live in
//!   one sequence; each bucket is a `(head, count)` slice of it.
//! - Layers:
//!   - EntryList<T>: doubly-linked list stored in a generational slot
//!     arena. Insert-before, push-back and remove are O(1) and never
//!     invalidate other entries' `Position`s.
//!   - BucketTable: one `(head, count)` descriptor per bucket. `head` is
//!     a non-owning `Position` into the list, `None` iff `count == 0`.
//!   - RunHashMap<K, V, S>: public API; hashes keys, walks runs, and
//!     grows the bucket table.
//!
//! Invariants (hold between public calls)
//! - Bucket `b`'s entries are the `count[b]` consecutive list entries
//!   starting at `head[b]`.
//! - `Σ count == len() == |list|`.
//! - Every entry in bucket `b` has `hash mod bucket_count == b`.
//! - `bucket_count == 0` until the first insertion and after `clear`.
//! - Keys are unique; `insert` never overwrites.
//! - After an insertion that added an entry, `2 * len >= bucket_count`
//!   doubles the table.
//!
//! Placement
//! - New entry in an empty bucket: appended at the back of the list.
//! - New entry in a non-empty bucket: linked right before the run's head
//!   and becomes the head. Other runs are never touched.
//!
//! Growth
//! - The first insertion allocates 4 buckets. Doubling resets every
//!   descriptor, detaches the list's chain and relinks each entry through
//!   the same placement rule, visiting entries in former list order.
//! - Entries stay in their arena slots, so `Position`s survive growth.
//! - Each entry caches its `u64` hash; growth never calls the hasher or
//!   `K: Hash`/`K: Eq`.
//!
//! Removal
//! - Removing a run's head moves `head` to the next entry before the
//!   entry is unlinked; the descriptor never points at a dead slot.
//!
//! Notes and non-goals
//! - Single-threaded; mutation requires `&mut self`, no internal locking.
//! - Iteration visits all entries; order is bucket-run order for `iter`,
//!   unspecified for `iter_mut`.
//! - No serialization.

mod bucket_table;
mod entry_list;
mod error;
pub mod run_hash_map;
mod run_hash_map_proptest;

// Public surface
pub use entry_list::Position;
pub use error::KeyNotFound;
pub use run_hash_map::RunHashMap;
