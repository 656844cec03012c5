//! EntryList: doubly-linked sequence stored in a generational slot arena.
//!
//! Nodes never move once allocated; links are arena keys, so inserting or
//! removing one node leaves every other `Position` valid. A removed node's
//! slot gets a bumped generation on reuse, so a stale `Position` resolves
//! to `None` instead of aliasing a newer entry.

use core::ops::{Index, IndexMut};
use slotmap::{DefaultKey, SlotMap};

/// Stable handle to one entry of the backing sequence.
///
/// Valid until that specific entry is removed. Growth of the owning map
/// relinks entries but never moves them, so handles survive it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Position(DefaultKey);

impl Position {
    pub(crate) fn raw_key(&self) -> DefaultKey {
        self.0
    }
}

#[derive(Debug)]
struct Node<T> {
    item: T,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

pub(crate) struct EntryList<T> {
    nodes: SlotMap<DefaultKey, Node<T>>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
}

impl<T> EntryList<T> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn front(&self) -> Option<Position> {
        self.head.map(Position)
    }

    /// Position following `pos`, or `None` at the end (or if `pos` is stale).
    pub(crate) fn next(&self, pos: Position) -> Option<Position> {
        self.nodes.get(pos.raw_key()).and_then(|n| n.next).map(Position)
    }

    pub(crate) fn get(&self, pos: Position) -> Option<&T> {
        self.nodes.get(pos.raw_key()).map(|n| &n.item)
    }

    pub(crate) fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        self.nodes.get_mut(pos.raw_key()).map(|n| &mut n.item)
    }

    pub(crate) fn push_back(&mut self, item: T) -> Position {
        let k = self.alloc(item);
        self.link_back(k);
        Position(k)
    }

    /// Inserts `item` immediately before the live entry at `at`.
    pub(crate) fn insert_before(&mut self, at: Position, item: T) -> Position {
        let k = self.alloc(item);
        self.link_before(at.raw_key(), k);
        Position(k)
    }

    pub(crate) fn remove(&mut self, pos: Position) -> Option<T> {
        let k = pos.raw_key();
        if !self.nodes.contains_key(k) {
            return None;
        }
        self.unlink(k);
        self.nodes.remove(k).map(|n| n.item)
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let head = self.front()?;
        self.remove(head)
    }

    /// Drops every entry. The arena keeps its slots so that positions handed
    /// out before the clear stay stale forever.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Detaches the whole chain and links every entry back in, visiting them
    /// in former sequence order. For each entry `anchor` returns the position
    /// to link it before, or `None` to append it at the back.
    ///
    /// Anchors must be entries already relinked during this pass.
    pub(crate) fn relink_all<F>(&mut self, mut anchor: F)
    where
        F: FnMut(Position, &T) -> Option<Position>,
    {
        let mut cur = self.head.take();
        self.tail = None;
        while let Some(k) = cur {
            let node = &self.nodes[k];
            cur = node.next;
            let at = anchor(Position(k), &node.item);
            match at {
                Some(at) => self.link_before(at.raw_key(), k),
                None => self.link_back(k),
            }
        }
    }

    /// Iterates in sequence order.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            nodes: &self.nodes,
            cur: self.head,
            remaining: self.nodes.len(),
        }
    }

    /// Iterates in arena order, which is unrelated to sequence order.
    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            it: self.nodes.iter_mut(),
        }
    }

    fn alloc(&mut self, item: T) -> DefaultKey {
        self.nodes.insert(Node {
            item,
            prev: None,
            next: None,
        })
    }

    fn link_back(&mut self, k: DefaultKey) {
        let prev = self.tail;
        let node = &mut self.nodes[k];
        node.prev = prev;
        node.next = None;
        match prev {
            Some(p) => self.nodes[p].next = Some(k),
            None => self.head = Some(k),
        }
        self.tail = Some(k);
    }

    fn link_before(&mut self, at: DefaultKey, k: DefaultKey) {
        let prev = self.nodes[at].prev;
        let node = &mut self.nodes[k];
        node.prev = prev;
        node.next = Some(at);
        self.nodes[at].prev = Some(k);
        match prev {
            Some(p) => self.nodes[p].next = Some(k),
            None => self.head = Some(k),
        }
    }

    fn unlink(&mut self, k: DefaultKey) {
        let (prev, next) = {
            let node = &self.nodes[k];
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
    }
}

impl<T> Default for EntryList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Position> for EntryList<T> {
    type Output = T;

    fn index(&self, pos: Position) -> &T {
        &self.nodes[pos.raw_key()].item
    }
}

impl<T> IndexMut<Position> for EntryList<T> {
    fn index_mut(&mut self, pos: Position) -> &mut T {
        &mut self.nodes[pos.raw_key()].item
    }
}

/// Sequence-order iterator over `(Position, &T)`.
pub(crate) struct Iter<'a, T> {
    nodes: &'a SlotMap<DefaultKey, Node<T>>,
    cur: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, T> Clone for Iter<'a, T> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            cur: self.cur,
            remaining: self.remaining,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Position, &'a T);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.cur?;
        let node = &self.nodes[k];
        self.cur = node.next;
        self.remaining -= 1;
        Some((Position(k), &node.item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> ExactSizeIterator for Iter<'a, T> {}

/// Arena-order iterator over `(Position, &mut T)`.
pub(crate) struct IterMut<'a, T> {
    it: slotmap::basic::IterMut<'a, DefaultKey, Node<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = (Position, &'a mut T);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(k, n)| (Position(k), &mut n.item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<'a, T> ExactSizeIterator for IterMut<'a, T> {}

/// Owning iterator that drains the list front to back.
pub(crate) struct IntoIter<T> {
    list: EntryList<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.list.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.list.len(), Some(self.list.len()))
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> IntoIterator for EntryList<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { list: self }
    }
}
