use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// LIFO container of items waiting to be dispatched.
///
/// The store itself is not synchronized; the engine only touches it through a [`SharedStore`].
#[derive(Debug)]
pub struct ItemStore<I> {
    items: Vec<I>,
}

impl<I> ItemStore<I> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Places `item` on top of the store.
    pub fn push(&mut self, item: I) {
        self.items.push(item);
    }

    /// Removes the most recently pushed item, or `None` when the store is empty.
    pub fn pop(&mut self) -> Option<I> {
        self.items.pop()
    }

    /// Item that the next [`ItemStore::pop`] would return.
    pub fn peek(&self) -> Option<&I> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Empties the store, returning items in pop order (top first).
    pub fn drain(&mut self) -> Vec<I> {
        let mut drained: Vec<I> = self.items.drain(..).collect();
        drained.reverse();
        drained
    }
}

impl<I> Default for ItemStore<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> FromIterator<I> for ItemStore<I> {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Cloneable handle guarding a single [`ItemStore`] behind an async mutex.
///
/// Puller pushes, Filler pops and Handler push-backs all go through this one lock.
pub struct SharedStore<I> {
    inner: Arc<Mutex<ItemStore<I>>>,
}

impl<I> SharedStore<I> {
    pub fn new(store: ItemStore<I>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, ItemStore<I>> {
        self.inner.lock().await
    }

    pub async fn push(&self, item: I) {
        self.inner.lock().await.push(item);
    }

    pub async fn pop(&self) -> Option<I> {
        self.inner.lock().await.pop()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    pub async fn drain(&self) -> Vec<I> {
        self.inner.lock().await.drain()
    }
}

impl<I> Clone for SharedStore<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> Default for SharedStore<I> {
    fn default() -> Self {
        Self::new(ItemStore::new())
    }
}
