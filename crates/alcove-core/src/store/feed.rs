//! Change feed primitives.
//!
//! A [`Feed`] is a live query over one key of the store: the first poll
//! yields the full current snapshot, every later poll yields a fresh full
//! snapshot after a change. Built on `tokio::sync::watch`, so a slow consumer
//! skips intermediate states but always observes the final one. Delivery is
//! at-most-once per state; there is no replay.

use tokio::sync::watch;

/// Consumer half of a change feed.
///
/// Obtained from [`Store::watch_room`](super::Store::watch_room) and friends.
/// Dropping a feed detaches the subscription; dropping the store ends all of
/// its feeds.
#[derive(Debug)]
pub struct Feed<T> {
    rx: watch::Receiver<T>,
    primed: bool,
}

impl<T: Clone> Feed<T> {
    /// Next snapshot.
    ///
    /// The first call resolves immediately with the current state; later
    /// calls wait for a change. Returns `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<T> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }

        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Current snapshot without waiting or consuming a change notification.
    pub fn latest(&self) -> T {
        self.rx.borrow().clone()
    }
}

/// Publisher half of a change feed, held by store implementations.
///
/// One publisher exists per (room, collection); every mutation publishes the
/// full new state after it is committed.
#[derive(Debug)]
pub struct FeedPublisher<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> FeedPublisher<T> {
    /// Create a publisher seeded with the given state.
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the published state and wake all feeds.
    ///
    /// Succeeds even with no attached feeds.
    pub fn publish(&self, state: T) {
        self.tx.send_replace(state);
    }

    /// Attach a new consumer. It will observe the current state on its first
    /// poll.
    pub fn subscribe(&self) -> Feed<T> {
        Feed { rx: self.tx.subscribe(), primed: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_poll_yields_current_state() {
        let publisher = FeedPublisher::new(vec![1, 2]);
        let mut feed = publisher.subscribe();

        assert_eq!(feed.next().await, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn later_polls_observe_updates() {
        let publisher = FeedPublisher::new(0u32);
        let mut feed = publisher.subscribe();
        assert_eq!(feed.next().await, Some(0));

        publisher.publish(7);
        assert_eq!(feed.next().await, Some(7));
    }

    #[tokio::test]
    async fn rapid_updates_collapse_to_latest() {
        let publisher = FeedPublisher::new(0u32);
        let mut feed = publisher.subscribe();
        assert_eq!(feed.next().await, Some(0));

        publisher.publish(1);
        publisher.publish(2);
        publisher.publish(3);

        // Intermediate states may be skipped; the final one must arrive.
        assert_eq!(feed.next().await, Some(3));
    }

    #[tokio::test]
    async fn feed_ends_when_publisher_drops() {
        let publisher = FeedPublisher::new(0u32);
        let mut feed = publisher.subscribe();
        assert_eq!(feed.next().await, Some(0));

        drop(publisher);
        assert_eq!(feed.next().await, None);
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_latest() {
        let publisher = FeedPublisher::new(0u32);
        publisher.publish(1);
        publisher.publish(2);

        let mut feed = publisher.subscribe();
        assert_eq!(feed.next().await, Some(2));
    }
}
