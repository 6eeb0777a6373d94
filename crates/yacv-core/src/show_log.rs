//! The show event log.
//!
//! An ordered log of [`ShowEvent`]s on top of a single [`Topic`]. Viewers
//! subscribe to it to receive update notifications; the scene queries it to
//! find what is currently shown.
//!
//! Showing or removing a name first deletes every retained event for that
//! name, so at most one event per name is retained and a lagging
//! subscription never sees a superseded one. Queries fold one snapshot of
//! the buffer with last-write-wins per name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use yacv_pubsub::{Sequence, StartAt, Subscription, Topic};
use yacv_types::ShowEvent;

/// Log of show and remove events, keyed by object name.
#[derive(Debug, Default)]
pub struct ShowLog {
    topic: Topic<Arc<ShowEvent>>,
}

impl ShowLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `event`, replacing every retained event with the same name.
    pub fn publish(&self, event: impl Into<Arc<ShowEvent>>) -> Arc<ShowEvent> {
        let event = event.into();
        let (superseded, sequence) = self
            .topic
            .replace_where(|old| old.name == event.name, Arc::clone(&event));
        debug!(
            name = %event.name,
            hash = %event.hash,
            is_remove = event.is_remove,
            superseded,
            sequence,
            "show event published"
        );
        event
    }

    /// Tombstone `name` if it is currently shown.
    ///
    /// Returns the published tombstone, or `None` when `name` is not
    /// current.
    pub fn remove(&self, name: &str) -> Option<Arc<ShowEvent>> {
        let current = self.current_event(name)?;
        Some(self.publish(current.tombstone()))
    }

    /// Tombstone every current name for which `keep` returns `false`.
    ///
    /// Returns the removed names in log order.
    pub fn clear(&self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let removed: Vec<String> = self
            .current_names(true)
            .into_iter()
            .filter(|name| !keep(name.as_str()))
            .collect();
        for name in &removed {
            self.remove(name);
        }
        removed
    }

    /// The latest event per name, in log order, from one snapshot.
    fn latest(&self) -> Vec<(Sequence, Arc<ShowEvent>)> {
        let mut latest: HashMap<String, (Sequence, Arc<ShowEvent>)> = HashMap::new();
        for (sequence, event) in self.topic.entries() {
            latest.insert(event.name.clone(), (sequence, event));
        }
        let mut latest: Vec<_> = latest.into_values().collect();
        latest.sort_unstable_by_key(|(sequence, _)| *sequence);
        latest
    }

    /// Names that have an event in the log, in order of their latest event.
    ///
    /// With `apply_removes`, names whose latest event is a tombstone are
    /// left out.
    pub fn current_names(&self, apply_removes: bool) -> Vec<String> {
        self.latest()
            .into_iter()
            .filter(|(_, event)| !(apply_removes && event.is_remove))
            .map(|(_, event)| event.name.clone())
            .collect()
    }

    /// The current (non-removed) events, in log order.
    pub fn current_events(&self) -> Vec<Arc<ShowEvent>> {
        self.latest()
            .into_iter()
            .map(|(_, event)| event)
            .filter(|event| !event.is_remove)
            .collect()
    }

    /// The current event for `name`, or `None` if it was never shown or
    /// was removed.
    pub fn current_event(&self, name: &str) -> Option<Arc<ShowEvent>> {
        self.topic
            .snapshot()
            .into_iter()
            .rev()
            .find(|event| event.name == name)
            .filter(|event| !event.is_remove)
    }

    /// Subscribe to the log.
    ///
    /// [`StartAt::Beginning`] replays the retained history first.
    pub fn subscribe(&self, start: StartAt) -> Subscription<Arc<ShowEvent>> {
        self.topic.subscribe(start)
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.topic.len()
    }

    /// Whether the log retains no events.
    pub fn is_empty(&self) -> bool {
        self.topic.is_empty()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.topic.subscriber_count()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use yacv_types::{BuildOptions, ShowPayload};

    use super::*;

    fn event(name: &str, hash: &str) -> ShowEvent {
        ShowEvent::new(
            name,
            hash,
            ShowPayload::Glb(Bytes::from(hash.to_owned())),
            BuildOptions::default(),
        )
    }

    #[test]
    fn reshow_keeps_one_current_event() {
        let log = ShowLog::new();
        log.publish(event("a", "1"));
        log.publish(event("a", "2"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.current_event("a").unwrap().hash, "2");
        assert_eq!(log.current_names(true), vec!["a"]);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_superseded_event() {
        let log = ShowLog::new();
        let mut viewer = log.subscribe(StartAt::End);
        log.publish(event("a", "1"));
        log.publish(event("b", "1"));
        log.publish(event("a", "2"));

        let seen: Vec<(String, String)> = [
            viewer.next().await.unwrap(),
            viewer.next().await.unwrap(),
        ]
        .iter()
        .map(|e| (e.name.clone(), e.hash.clone()))
        .collect();
        assert_eq!(
            seen,
            vec![
                ("b".to_owned(), "1".to_owned()),
                ("a".to_owned(), "2".to_owned()),
            ]
        );
        assert_eq!(viewer.try_next(), Ok(None));
    }

    #[test]
    fn remove_tombstones_with_last_hash() {
        let log = ShowLog::new();
        log.publish(event("a", "1"));
        let tombstone = log.remove("a").unwrap();
        assert!(tombstone.is_remove);
        assert_eq!(tombstone.hash, "1");
        assert!(log.current_event("a").is_none());
        assert!(log.current_names(true).is_empty());
        assert_eq!(log.current_names(false), vec!["a"]);
        assert!(log.remove("a").is_none());
        assert!(log.remove("never").is_none());
    }

    #[test]
    fn clear_keeps_exceptions() {
        let log = ShowLog::new();
        for name in ["a", "b", "c"] {
            log.publish(event(name, "1"));
        }
        let removed = log.clear(|name| name == "b");
        assert_eq!(removed, vec!["a", "c"]);
        assert_eq!(log.current_names(true), vec!["b"]);
        assert_eq!(log.current_events().len(), 1);
    }

    #[test]
    fn names_follow_latest_event_order() {
        let log = ShowLog::new();
        log.publish(event("a", "1"));
        log.publish(event("b", "1"));
        log.publish(event("a", "2"));
        assert_eq!(log.current_names(true), vec!["b", "a"]);
    }
}
