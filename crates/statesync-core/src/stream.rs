// ── Async property streams ──
//
// Bridges a single-threaded `Property` into a `watch` channel so async code
// (a render loop, a network relay) can await changes instead of registering
// a callback.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::listener::Subscription;

/// A subscription to a property, vended by
/// [`ReadOnlyProperty::watch`](crate::ReadOnlyProperty::watch).
///
/// Provides both point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`. Dropping
/// it detaches from the property.
pub struct PropertyStream<T> {
    current: T,
    receiver: watch::Receiver<T>,
    _link: Subscription,
}

impl<T: Clone> PropertyStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<T>, link: Subscription) -> Self {
        let current = receiver.borrow().clone();
        Self {
            current,
            receiver,
            _link: link,
        }
    }

    /// The value captured at creation or by the last `changed()`.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// The latest value (may have changed since creation).
    pub fn latest(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new value.
    /// Returns `None` if the property side has gone away.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        let value = self.receiver.borrow_and_update().clone();
        self.current = value.clone();
        Some(value)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The stream yields the current value first, then every change.
    /// Changes that happen faster than the consumer polls are coalesced.
    pub fn into_stream(self) -> PropertyWatchStream<T>
    where
        T: Send + Sync + 'static,
    {
        PropertyWatchStream {
            inner: WatchStream::new(self.receiver),
            _link: self._link,
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct PropertyWatchStream<T> {
    inner: WatchStream<T>,
    _link: Subscription,
}

impl<T: Clone + Send + Sync + 'static> Stream for PropertyWatchStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
