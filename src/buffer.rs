use std::{fmt, mem, num::NonZeroUsize};

use tracing::trace;

use super::error::InvalidCapacity;

/// A buffer holding up to `capacity` items in insertion order.
///
/// The buffer never grows beyond its capacity: once full, [`add`](BatchBuffer::add) hands the
/// item back and the caller has to [`flush`](BatchBuffer::flush) first. It performs no
/// synchronisation of its own.
pub struct BatchBuffer<T> {
    capacity: NonZeroUsize,
    items: Vec<T>,
}

/// The item rejected by [`BatchBuffer::add`] because the buffer was full.
#[derive(Debug, Eq, PartialEq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> BatchBuffer<T> {
    /// Creates an empty buffer, failing if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, InvalidCapacity> {
        NonZeroUsize::new(capacity)
            .map(Self::with_capacity)
            .ok_or(InvalidCapacity(capacity))
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity.get()),
        }
    }

    /// Appends `item`, or returns it back if the buffer is already full.
    pub fn add(&mut self, item: T) -> Result<(), Full<T>> {
        if self.is_full() {
            return Err(Full(item));
        }
        self.items.push(item);
        Ok(())
    }

    /// Takes every buffered item as one batch, leaving the buffer empty.
    ///
    /// Returns `None` when there is nothing to flush; batches are never empty.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        if self.items.is_empty() {
            return None;
        }
        let batch = mem::replace(&mut self.items, Vec::with_capacity(self.capacity.get()));
        trace!(size = batch.len(), "buffer flushed");
        Some(batch)
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity.get()
    }
}

impl<T> fmt::Debug for BatchBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BatchBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.items.len())
            .finish()
    }
}
