//! Subscriber cursors over a [`Topic`](crate::Topic).

use std::fmt;
use std::pin::pin;
use std::sync::Arc;

use futures::Stream;
use tracing::trace;

use crate::topic::{Sequence, Shared};

/// Returned by [`Subscription::try_next`] once the subscription is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("subscription closed")]
pub struct Closed;

/// One reader's cursor over a topic.
///
/// The cursor lives in the subscription itself, so reads never contend
/// with other subscribers beyond the short buffer lock. Dropping the
/// subscription unregisters it.
pub struct Subscription<T> {
    shared: Arc<Shared<T>>,
    id: u64,
    cursor: Sequence,
}

/// Closes a subscription from another task.
///
/// Obtained from [`Subscription::closer`]. Closing wakes a read that is
/// suspended in [`Subscription::next`].
pub struct Closer<T> {
    shared: Arc<Shared<T>>,
    id: u64,
}

enum Step<T> {
    Item(T),
    Empty,
    Closed,
}

impl<T> Subscription<T> {
    pub(crate) const fn new(shared: Arc<Shared<T>>, id: u64, cursor: Sequence) -> Self {
        Self { shared, id, cursor }
    }

    /// Sequence of the next item this subscription will look at.
    pub const fn cursor(&self) -> Sequence {
        self.cursor
    }

    /// Whether the subscription has been closed.
    pub fn is_closed(&self) -> bool {
        !self.shared.lock().subscribers.contains(&self.id)
    }

    /// A handle that can close this subscription from elsewhere.
    pub fn closer(&self) -> Closer<T> {
        Closer {
            shared: Arc::clone(&self.shared),
            id: self.id,
        }
    }

    /// Close the subscription and release its cursor.
    pub fn close(self) {
        drop(self);
    }
}

impl<T: Clone> Subscription<T> {
    fn step(&mut self) -> Step<T> {
        let next = {
            let state = self.shared.lock();
            if !state.subscribers.contains(&self.id) {
                return Step::Closed;
            }
            state
                .items
                .range(self.cursor..)
                .next()
                .map(|(sequence, item)| (*sequence, item.clone()))
        };
        match next {
            Some((sequence, item)) => {
                self.cursor = sequence.saturating_add(1);
                Step::Item(item)
            }
            None => Step::Empty,
        }
    }

    /// Take the next item without waiting.
    ///
    /// Returns `Ok(None)` when the subscription has caught up.
    pub fn try_next(&mut self) -> Result<Option<T>, Closed> {
        match self.step() {
            Step::Item(item) => Ok(Some(item)),
            Step::Empty => Ok(None),
            Step::Closed => Err(Closed),
        }
    }

    /// Wait for the next item.
    ///
    /// Suspends until an item is published past the cursor or the
    /// subscription is closed, in which case it returns `None`. The item is
    /// taken synchronously inside a single poll, so dropping this future
    /// (e.g. in a `select!`) never loses an item.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            let shared = Arc::clone(&self.shared);
            let mut notified = pin!(shared.notify.notified());
            // Register for wake-ups before checking, so a publish between the
            // check and the await is not missed.
            notified.as_mut().enable();
            match self.step() {
                Step::Item(item) => return Some(item),
                Step::Closed => return None,
                Step::Empty => {}
            }
            notified.await;
        }
    }

    /// Turn the subscription into a [`Stream`] that ends when it is closed.
    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|item| (item, subscription))
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.shared.lock().subscribers.remove(&self.id);
        trace!(subscriber = self.id, "unsubscribed");
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl<T> Closer<T> {
    /// Close the subscription and wake any pending read on it.
    ///
    /// Closing an already-closed subscription does nothing.
    pub fn close(&self) {
        let removed = self.shared.lock().subscribers.remove(&self.id);
        if removed {
            trace!(subscriber = self.id, "subscription closed");
            self.shared.notify.notify_waiters();
        }
    }
}

impl<T> Clone for Closer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            id: self.id,
        }
    }
}

impl<T> fmt::Debug for Closer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use crate::{StartAt, Topic};

    use super::*;

    #[tokio::test]
    async fn try_next_reports_closed() {
        let topic = Topic::new();
        let mut sub = topic.subscribe(StartAt::Beginning);
        topic.publish(1);
        assert_eq!(sub.try_next(), Ok(Some(1)));
        assert_eq!(sub.try_next(), Ok(None));
        assert_eq!(sub.cursor(), 1);

        sub.closer().close();
        assert!(sub.is_closed());
        assert_eq!(sub.try_next(), Err(Closed));
    }

    #[tokio::test]
    async fn stream_ends_when_closed() {
        let topic = Topic::new();
        topic.publish("a");
        topic.publish("b");
        let sub = topic.subscribe(StartAt::Beginning);
        let closer = sub.closer();

        let mut stream = Box::pin(sub.into_stream());
        assert_eq!(stream.next().await, Some("a"));
        assert_eq!(stream.next().await, Some("b"));
        closer.close();
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn dropping_unregisters() {
        let topic: Topic<u8> = Topic::new();
        let sub = topic.subscribe(StartAt::End);
        assert_eq!(topic.subscriber_count(), 1);
        drop(sub);
        assert_eq!(topic.subscriber_count(), 0);
    }
}
