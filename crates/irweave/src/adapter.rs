//! The cursor + sentinel iterator template.
//!
//! Every traversable collection is exposed through [`Adapter`], which holds a
//! position cursor and an end sentinel into a collection it does not own. A
//! [`Traversal`] supplies the per-kind parts: what a position is, how to step
//! to the next one, and how to turn a position into the yielded element.
//!
//! `next` reads the element at the cursor, then advances by exactly one. Once
//! the cursor equals the sentinel, every further `next` returns `None` without
//! touching any state.

use std::iter::FusedIterator;

/// Per-kind half of an adapter.
pub trait Traversal {
    /// Position inside the collection; the end sentinel is one of these.
    type Position: Copy + PartialEq;
    /// What `next` yields.
    type Item;

    /// Element at `at`. `None` means the position no longer names an
    /// element, which ends the traversal.
    fn element(&self, at: Self::Position) -> Option<Self::Item>;

    /// Position right after `at`.
    fn successor(&self, at: Self::Position) -> Self::Position;
}

/// Heap-allocatable iterator over a borrowed collection range.
pub struct Adapter<T: Traversal> {
    source: T,
    cursor: T::Position,
    end: T::Position,
}

impl<T: Traversal> Adapter<T> {
    /// Captures the range `[begin, end)` as it is right now.
    pub fn new(source: T, begin: T::Position, end: T::Position) -> Self {
        Self {
            source,
            cursor: begin,
            end,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor == self.end
    }

    pub fn source(&self) -> &T {
        &self.source
    }
}

impl<T: Traversal> Iterator for Adapter<T> {
    type Item = T::Item;

    fn next(&mut self) -> Option<T::Item> {
        if self.cursor == self.end {
            return None;
        }
        match self.source.element(self.cursor) {
            Some(item) => {
                self.cursor = self.source.successor(self.cursor);
                Some(item)
            }
            None => {
                self.cursor = self.end;
                None
            }
        }
    }
}

impl<T: Traversal> FusedIterator for Adapter<T> {}

/// Traversal over a slice, projecting each entry through a function that
/// also receives a copyable context (typically the owning module).
///
/// Positions are slice indices; the end sentinel is the slice length at
/// creation time.
pub struct Indexed<'m, C, E, I> {
    context: C,
    items: &'m [E],
    project: fn(C, &'m E) -> Option<I>,
}

impl<'m, C: Copy, E, I> Indexed<'m, C, E, I> {
    pub fn adapter(
        context: C,
        items: &'m [E],
        project: fn(C, &'m E) -> Option<I>,
    ) -> Adapter<Self> {
        let end = items.len();
        Adapter::new(
            Self {
                context,
                items,
                project,
            },
            0,
            end,
        )
    }
}

impl<'m, C: Copy, E, I> Traversal for Indexed<'m, C, E, I> {
    type Position = usize;
    type Item = I;

    fn element(&self, at: usize) -> Option<I> {
        let item = self.items.get(at)?;
        (self.project)(self.context, item)
    }

    fn successor(&self, at: usize) -> usize {
        at + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts `0..len`, yielding each position.
    struct Counting {
        len: u32,
    }

    impl Traversal for Counting {
        type Position = u32;
        type Item = u32;

        fn element(&self, at: u32) -> Option<u32> {
            (at < self.len).then_some(at)
        }

        fn successor(&self, at: u32) -> u32 {
            at + 1
        }
    }

    #[test]
    fn yields_range_in_order_then_stays_exhausted() {
        let mut adapter = Adapter::new(Counting { len: 3 }, 0, 3);
        assert_eq!(adapter.next(), Some(0));
        assert_eq!(adapter.next(), Some(1));
        assert_eq!(adapter.next(), Some(2));
        assert!(adapter.is_exhausted());
        for _ in 0..4 {
            assert_eq!(adapter.next(), None);
        }
    }

    #[test]
    fn empty_range() {
        let mut adapter = Adapter::new(Counting { len: 0 }, 5, 5);
        assert!(adapter.is_exhausted());
        assert_eq!(adapter.next(), None);
    }

    #[test]
    fn stale_position_ends_the_traversal() {
        // The range claims five elements but the collection only has two.
        let mut adapter = Adapter::new(Counting { len: 2 }, 0, 5);
        assert_eq!(adapter.by_ref().count(), 2);
        assert!(adapter.is_exhausted());
        assert_eq!(adapter.next(), None);
    }

    #[test]
    fn indexed_projection_skips_nothing() {
        let words = ["a", "b", "c"];
        let adapter =
            Indexed::adapter(10, &words[..], |base: usize, w: &&str| Some(base + w.len()));
        assert_eq!(adapter.collect::<Vec<_>>(), vec![11, 11, 11]);
    }
}

#[cfg(kani)]
mod proofs {
    use super::*;

    struct Bounded {
        len: u8,
    }

    impl Traversal for Bounded {
        type Position = u8;
        type Item = u8;

        fn element(&self, at: u8) -> Option<u8> {
            (at < self.len).then_some(at)
        }

        fn successor(&self, at: u8) -> u8 {
            at + 1
        }
    }

    /// `next` yields exactly `len` elements in order, then only `None`.
    #[kani::proof]
    #[kani::unwind(8)]
    fn yields_exactly_len_elements() {
        let len: u8 = kani::any();
        kani::assume(len <= 5);
        let mut adapter = Adapter::new(Bounded { len }, 0, len);

        let mut expected = 0u8;
        while let Some(item) = adapter.next() {
            assert_eq!(item, expected);
            expected += 1;
        }
        assert_eq!(expected, len);
        assert!(adapter.next().is_none());
        assert!(adapter.is_exhausted());
    }

    /// Once exhausted, `next` leaves the cursor untouched.
    #[kani::proof]
    fn exhaustion_is_idempotent() {
        let end: u8 = kani::any();
        let mut adapter = Adapter::new(Bounded { len: end }, end, end);
        assert!(adapter.next().is_none());
        assert!(adapter.next().is_none());
        assert!(adapter.is_exhausted());
    }
}
