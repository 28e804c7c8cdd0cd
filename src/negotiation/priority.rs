//! Quality-ordered priority queue shared by every negotiated header.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::Quality;

/// A header candidate that carries an RFC 7231 preference weight.
pub trait Prioritized {
    /// The candidate's `q` value (`1` when absent).
    fn quality(&self) -> Quality;

    /// `true` when the client wrote `q=` explicitly.
    fn quality_explicit(&self) -> bool;
}

// Heap entry. `seq` keeps equal-priority candidates in header order.
#[derive(Debug)]
struct Ranked<T> {
    item: T,
    quality: Quality,
    explicit: bool,
    seq: u64,
}

impl<T> Ranked<T> {
    fn key(&self) -> (Quality, bool) {
        (self.quality, self.explicit)
    }
}

impl<T> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Ranked<T> {}

impl<T> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ranked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(&other.key())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Max-heap keyed by `(quality desc, explicit desc)`.
///
/// RFC 7231 leaves the order of equally weighted entries unspecified. Here an
/// explicit `q=` outranks the implicit default, so `"a;q=1.0, b"` yields `a`
/// first; entries that are still tied come out in the order they were pushed.
///
/// # Examples
///
/// ```
/// use conneg::negotiation::parse_media_types;
///
/// let mut queue = parse_media_types("text/plain, application/json;q=1").unwrap();
/// assert_eq!(queue.pop().unwrap().media_type(), "application/json");
/// assert_eq!(queue.pop().unwrap().media_type(), "text/plain");
/// assert!(queue.pop().is_none());
/// ```
#[derive(Debug)]
pub struct PriorityQueue<T> {
    heap: BinaryHeap<Ranked<T>>,
    next_seq: u64,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T: Prioritized> PriorityQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a candidate.
    pub fn push(&mut self, item: T) {
        let ranked = Ranked {
            quality: item.quality(),
            explicit: item.quality_explicit(),
            seq: self.next_seq,
            item,
        };
        self.next_seq += 1;
        self.heap.push(ranked);
    }

    /// Removes and returns the most preferred candidate.
    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|ranked| ranked.item)
    }

    /// Returns the most preferred candidate without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|ranked| &ranked.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T: Prioritized> FromIterator<T> for PriorityQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::new();
        for item in iter {
            queue.push(item);
        }
        queue
    }
}

impl<T: Prioritized> Iterator for PriorityQueue<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.pop()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len(), Some(self.len()))
    }
}
