use std::sync::Arc;

/// Capability every value moved through the engine must expose.
///
/// The engine never interprets [`QueueItem::index`]; it is carried into logs so item types can
/// define it however they need (a timestamp, a sequence number, a priority).
pub trait QueueItem: Send + 'static {
    /// Ordering or index value attached to the item.
    fn index(&self) -> i64;

    /// Identity used for logging and correlation.
    fn key(&self) -> String;
}

impl<T: QueueItem + ?Sized> QueueItem for Box<T> {
    fn index(&self) -> i64 {
        (**self).index()
    }

    fn key(&self) -> String {
        (**self).key()
    }
}

impl<T: QueueItem + Sync + ?Sized> QueueItem for Arc<T> {
    fn index(&self) -> i64 {
        (**self).index()
    }

    fn key(&self) -> String {
        (**self).key()
    }
}

macro_rules! impl_keyed_tuple_item {
    ($($index:ty),+ $(,)?) => {
        $(
            impl QueueItem for ($index, String) {
                /// Unsigned values above `i64::MAX` saturate.
                fn index(&self) -> i64 {
                    i64::try_from(self.0).unwrap_or(i64::MAX)
                }

                fn key(&self) -> String {
                    self.1.clone()
                }
            }
        )+
    };
}

impl_keyed_tuple_item!(i32, i64, u32, u64, usize);
