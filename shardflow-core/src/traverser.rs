//! Lazy, pull based sequences.
//!
//! A [Traverser] produces one item per call to [Traverser::next] and signals
//! exhaustion with `Ok(None)`. Processors use traversers to prepare their output
//! and an [Emitter](crate::processor::Emitter) to move items into the outbox until
//! the outbox refuses more, which lets a processor stop mid-sequence and resume on
//! the next scheduling turn.

use std::convert::Infallible;

/// A lazy sequence of items
pub trait Traverser<T> {
    /// Error which may occur while producing the next item
    type Error;

    /// Produce the next item, `Ok(None)` if the sequence is exhausted.
    /// Once exhausted, all further calls must return `Ok(None)` as well.
    fn next(&mut self) -> Result<Option<T>, Self::Error>;
}

/// Traverser over the items of an [Iterator]
#[derive(Debug, Clone)]
pub struct IterTraverser<I>(std::iter::Fuse<I>);

impl<I> Traverser<I::Item> for IterTraverser<I>
where
    I: Iterator,
{
    type Error = Infallible;

    fn next(&mut self) -> Result<Option<I::Item>, Self::Error> {
        Ok(self.0.next())
    }
}

/// Traverse all items of an iterable
pub fn traverse_iter<I: IntoIterator>(iter: I) -> IterTraverser<I::IntoIter> {
    IterTraverser(iter.into_iter().fuse())
}

/// Traverser yielding exactly one item
pub fn singleton<T>(item: T) -> IterTraverser<std::option::IntoIter<T>> {
    traverse_iter(Some(item))
}

/// Traverser yielding nothing
pub fn empty<T>() -> IterTraverser<std::option::IntoIter<T>> {
    traverse_iter(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exhaust an infallible traverser into a Vec
    fn collect<T>(mut t: impl Traverser<T, Error = Infallible>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(Some(x)) = t.next() {
            out.push(x);
        }
        out
    }

    #[test]
    fn traverses_in_order() {
        assert_eq!(collect(traverse_iter(vec![1, 2, 3])), vec![1, 2, 3]);
    }

    #[test]
    fn stays_exhausted() {
        let mut t = singleton(42);
        assert_eq!(t.next(), Ok(Some(42)));
        assert_eq!(t.next(), Ok(None));
        assert_eq!(t.next(), Ok(None));
    }

    #[test]
    fn empty_yields_nothing() {
        assert!(collect(empty::<u8>()).is_empty());
    }
}
