use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Bounded FIFO buffer between the store and the handler roles.
///
/// Occupancy never exceeds [`Bridge::capacity`]; a full bridge suspends senders until a handler
/// receives an item.
pub struct Bridge<I> {
    tx: mpsc::Sender<I>,
    rx: Mutex<mpsc::Receiver<I>>,
    capacity: usize,
}

impl<I: Send> Bridge<I> {
    /// Creates a bridge holding at most `capacity` items; zero is clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Waits for a free slot and holds it until the returned permit is used or dropped.
    ///
    /// Returns `None` when `shutdown` fires first.
    pub async fn reserve(&self, shutdown: &CancellationToken) -> Option<mpsc::Permit<'_, I>> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            // The receiver lives as long as the bridge, so reserve cannot observe a closed channel.
            permit = self.tx.reserve() => permit.ok(),
        }
    }

    /// Sends `item`, waiting while the bridge is full.
    ///
    /// Returns the item back when `shutdown` fires before space frees up.
    pub async fn send(&self, item: I, shutdown: &CancellationToken) -> Result<(), I> {
        match self.reserve(shutdown).await {
            Some(permit) => {
                permit.send(item);
                Ok(())
            }
            None => Err(item),
        }
    }

    /// Receives the oldest buffered item, waiting while the bridge is empty.
    ///
    /// Returns `None` once `shutdown` fires.
    pub async fn recv(&self, shutdown: &CancellationToken) -> Option<I> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            item = async {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            } => item,
        }
    }

    /// Receives without waiting; used to account for items left behind at shutdown.
    pub async fn drain(&self) -> Vec<I> {
        let mut rx = self.rx.lock().await;
        let mut drained = Vec::with_capacity(self.capacity);
        while let Ok(item) = rx.try_recv() {
            drained.push(item);
        }
        drained
    }
}
