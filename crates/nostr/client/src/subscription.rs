//! Subscription tracking and bounded event collection.
//!
//! A query opens one `REQ` per connected relay and reads until one of three
//! things happens:
//!
//! - every subscribed relay has sent `EOSE` and no new event arrived for
//!   `idle_timeout` (stragglers inside that window are still collected),
//! - `hard_timeout` elapses, whatever the relays are doing,
//! - the caller cancels.
//!
//! Events are deduplicated by id; the result is a set, not an ordering.

use crate::message::Filter;
use crate::pool::RelayPool;
use futures::Stream;
use nostr::{Event, sort_events};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Generate a unique subscription ID.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Timing for a bounded query.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Quiet period after all relays sent EOSE
    pub idle_timeout: Duration,
    /// Ceiling on the whole query
    pub hard_timeout: Duration,
    /// Send `CLOSE` to each relay as soon as it sends EOSE
    pub close_on_eose: bool,
    pub cancel: CancellationToken,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(800),
            hard_timeout: Duration::from_secs(8),
            close_on_eose: false,
            cancel: CancellationToken::new(),
        }
    }
}

impl FetchOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn close_on_eose(mut self) -> Self {
        self.close_on_eose = true;
        self
    }
}

/// Why a query stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// All relays finished and the idle window passed
    Idle,
    HardTimeout,
    Cancelled,
    /// Every relay connection went away
    Closed,
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Receiving,
    Eosed,
    Closed,
}

/// Result of a bounded query.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Unique events, in arrival order
    pub events: Vec<Event>,
    pub stop: StopReason,
    /// Relays that sent EOSE
    pub eose_relays: usize,
    /// Relays the `REQ` was sent to
    pub relay_count: usize,
}

impl FetchOutcome {
    /// Newest first, ties broken by id.
    pub fn sorted(mut self) -> Vec<Event> {
        sort_events(&mut self.events);
        self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// What the pool forwards to one subscription.
#[derive(Debug, Clone)]
pub(crate) enum SubscriptionUpdate {
    Event { relay_url: String, event: Event },
    Eose { relay_url: String },
    Closed { relay_url: String, message: String },
    Disconnected { relay_url: String },
}

/// Tracks which relays have a specific subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionTracker {
    pub id: String,
    pub filters: Vec<Filter>,
    /// Relays that have this subscription
    pub relays: HashSet<String>,
    /// Whether EOSE has been received from all relays
    pub all_eose: bool,
    /// Relays that have sent EOSE
    pub eose_relays: HashSet<String>,
}

impl SubscriptionTracker {
    pub fn new(id: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self {
            id: id.into(),
            filters,
            relays: HashSet::new(),
            all_eose: false,
            eose_relays: HashSet::new(),
        }
    }

    pub fn add_relay(&mut self, relay_url: impl Into<String>) {
        self.relays.insert(relay_url.into());
        self.update_all_eose();
    }

    pub fn remove_relay(&mut self, relay_url: &str) {
        self.relays.remove(relay_url);
        self.eose_relays.remove(relay_url);
        self.update_all_eose();
    }

    /// Mark EOSE received from a relay. Unknown relays are ignored.
    pub fn mark_eose(&mut self, relay_url: &str) {
        if self.relays.contains(relay_url) {
            self.eose_relays.insert(relay_url.to_string());
        }
        self.update_all_eose();
    }

    fn update_all_eose(&mut self) {
        self.all_eose = !self.relays.is_empty() && self.relays.len() == self.eose_relays.len();
    }

    /// No relay left that could still send stored events.
    pub fn is_settled(&self) -> bool {
        self.relays.is_empty() || self.all_eose
    }

    pub fn has_relay(&self, relay_url: &str) -> bool {
        self.relays.contains(relay_url)
    }

    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }
}

/// Live events of one query.
///
/// Pull with [`EventStream::next`] or adapt with [`EventStream::into_stream`].
/// Dropping the stream closes the subscription on every relay.
pub struct EventStream {
    tracker: SubscriptionTracker,
    relay_count: usize,
    updates: mpsc::UnboundedReceiver<SubscriptionUpdate>,
    seen: HashSet<String>,
    options: FetchOptions,
    hard_deadline: Instant,
    idle_deadline: Option<Instant>,
    state: SubscriptionState,
    stop: Option<StopReason>,
    pool: Option<RelayPool>,
}

impl EventStream {
    pub(crate) fn new(
        tracker: SubscriptionTracker,
        updates: mpsc::UnboundedReceiver<SubscriptionUpdate>,
        options: FetchOptions,
        pool: Option<RelayPool>,
    ) -> Self {
        let now = Instant::now();
        let idle_deadline = tracker.is_settled().then(|| now + options.idle_timeout);
        Self {
            relay_count: tracker.relay_count(),
            tracker,
            updates,
            seen: HashSet::new(),
            hard_deadline: now + options.hard_timeout,
            idle_deadline,
            options,
            state: SubscriptionState::Pending,
            stop: None,
            pool,
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.tracker.id
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Set once the stream has ended.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Next unseen event, or `None` once the query has stopped.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            if self.stop.is_some() {
                return None;
            }

            let idle_deadline = self.idle_deadline;
            let update = tokio::select! {
                biased;
                _ = self.options.cancel.cancelled() => {
                    self.finish(StopReason::Cancelled).await;
                    continue;
                }
                _ = sleep_until(self.hard_deadline) => {
                    self.finish(StopReason::HardTimeout).await;
                    continue;
                }
                _ = sleep_until_opt(idle_deadline) => {
                    self.finish(StopReason::Idle).await;
                    continue;
                }
                update = self.updates.recv() => update,
            };

            let Some(update) = update else {
                self.finish(StopReason::Closed).await;
                continue;
            };

            if let Some(event) = self.apply(update).await {
                return Some(event);
            }
        }
    }

    async fn apply(&mut self, update: SubscriptionUpdate) -> Option<Event> {
        match update {
            SubscriptionUpdate::Event { relay_url, event } => {
                if !self.seen.insert(event.id.clone()) {
                    debug!(
                        "Duplicate event {} from {} on {}",
                        event.id, relay_url, self.tracker.id
                    );
                    return None;
                }
                if self.state == SubscriptionState::Pending {
                    self.state = SubscriptionState::Receiving;
                }
                if self.idle_deadline.is_some() {
                    self.idle_deadline = Some(Instant::now() + self.options.idle_timeout);
                }
                Some(event)
            }
            SubscriptionUpdate::Eose { relay_url } => {
                self.tracker.mark_eose(&relay_url);
                if self.options.close_on_eose
                    && let Some(ref pool) = self.pool
                {
                    pool.close_on_relay(&relay_url, &self.tracker.id).await;
                }
                self.settle_if_done();
                None
            }
            SubscriptionUpdate::Closed { relay_url, message } => {
                debug!(
                    "Relay {} closed {}: {}",
                    relay_url, self.tracker.id, message
                );
                self.tracker.mark_eose(&relay_url);
                self.settle_if_done();
                None
            }
            SubscriptionUpdate::Disconnected { relay_url } => {
                self.tracker.remove_relay(&relay_url);
                self.settle_if_done();
                None
            }
        }
    }

    fn settle_if_done(&mut self) {
        if self.idle_deadline.is_none() && self.tracker.is_settled() {
            self.state = SubscriptionState::Eosed;
            self.idle_deadline = Some(Instant::now() + self.options.idle_timeout);
        }
    }

    async fn finish(&mut self, reason: StopReason) {
        debug!("Subscription {} stopped: {:?}", self.tracker.id, reason);
        self.stop = Some(reason);
        self.state = SubscriptionState::Closed;
        self.updates.close();
        if let Some(pool) = self.pool.take() {
            pool.unsubscribe(&self.tracker.id).await;
        }
    }

    /// Drain the stream into an outcome.
    pub async fn collect(mut self) -> FetchOutcome {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        FetchOutcome {
            events,
            stop: self.stop.unwrap_or(StopReason::Closed),
            eose_relays: self.tracker.eose_relays.len(),
            relay_count: self.relay_count,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Event> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            let id = self.tracker.id.clone();
            handle.spawn(async move { pool.unsubscribe(&id).await });
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr::{EventTemplate, Keys, finalize_event};
    use tokio::time::sleep;

    const RELAY_A: &str = "wss://a.example.com";
    const RELAY_B: &str = "wss://b.example.com";

    fn event(keys: &Keys, content: &str) -> Event {
        finalize_event(&EventTemplate::new(1, content), keys.secret_key()).unwrap()
    }

    fn stream_for(
        relays: &[&str],
        options: FetchOptions,
    ) -> (mpsc::UnboundedSender<SubscriptionUpdate>, EventStream) {
        let mut tracker = SubscriptionTracker::new(generate_subscription_id(), vec![]);
        for relay in relays {
            tracker.add_relay(*relay);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, EventStream::new(tracker, rx, options, None))
    }

    fn deliver(relay: &str, event: &Event) -> SubscriptionUpdate {
        SubscriptionUpdate::Event {
            relay_url: relay.to_string(),
            event: event.clone(),
        }
    }

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {:?}, expected {:?}",
            elapsed,
            expected
        );
    }

    fn eose(relay: &str) -> SubscriptionUpdate {
        SubscriptionUpdate::Eose {
            relay_url: relay.to_string(),
        }
    }

    #[test]
    fn test_generate_subscription_id() {
        let id1 = generate_subscription_id();
        let id2 = generate_subscription_id();

        assert_eq!(id1.len(), 8);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_subscription_tracker_eose() {
        let mut tracker = SubscriptionTracker::new("sub1", vec![]);

        tracker.add_relay(RELAY_A);
        tracker.add_relay(RELAY_B);
        assert!(!tracker.all_eose);

        tracker.mark_eose(RELAY_A);
        assert!(!tracker.all_eose);

        tracker.mark_eose("wss://stranger.example.com");
        assert!(!tracker.all_eose);

        tracker.mark_eose(RELAY_B);
        assert!(tracker.all_eose);
    }

    #[test]
    fn test_subscription_tracker_remove_relay_settles() {
        let mut tracker = SubscriptionTracker::new("sub1", vec![]);

        tracker.add_relay(RELAY_A);
        tracker.add_relay(RELAY_B);
        tracker.mark_eose(RELAY_A);
        assert!(!tracker.is_settled());

        tracker.remove_relay(RELAY_B);
        assert!(tracker.is_settled());

        tracker.remove_relay(RELAY_A);
        assert!(tracker.is_settled());
        assert!(!tracker.all_eose);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_event_from_two_relays_is_returned_once() {
        let keys = Keys::generate();
        let shared = event(&keys, "shared");
        let (tx, stream) = stream_for(&[RELAY_A, RELAY_B], FetchOptions::default());

        tx.send(deliver(RELAY_A, &shared)).unwrap();
        tx.send(deliver(RELAY_B, &shared)).unwrap();
        tx.send(eose(RELAY_A)).unwrap();
        tx.send(eose(RELAY_B)).unwrap();

        let outcome = stream.collect().await;
        assert_eq!(outcome.events, vec![shared]);
        assert_eq!(outcome.stop, StopReason::Idle);
        assert_eq!(outcome.eose_relays, 2);
        assert_eq!(outcome.relay_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_straggler_inside_idle_window_is_included() {
        let keys = Keys::generate();
        let first = event(&keys, "first");
        let straggler = event(&keys, "straggler");
        let (tx, stream) = stream_for(&[RELAY_A], FetchOptions::default());

        let start = Instant::now();
        let sender = tokio::spawn({
            let straggler = straggler.clone();
            async move {
                tx.send(deliver(RELAY_A, &first)).unwrap();
                tx.send(eose(RELAY_A)).unwrap();
                sleep(Duration::from_millis(500)).await;
                tx.send(deliver(RELAY_A, &straggler)).unwrap();
                // Keep the channel open past the idle window
                sleep(Duration::from_secs(30)).await;
            }
        });

        let outcome = stream.collect().await;
        assert_eq!(outcome.events.len(), 2);
        assert!(outcome.events.contains(&straggler));
        assert_eq!(outcome.stop, StopReason::Idle);
        // Idle timer restarted by the straggler: 500 ms + 800 ms
        assert_elapsed(start, Duration::from_millis(1300));
        sender.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_after_idle_window_is_not_included() {
        let keys = Keys::generate();
        let late = event(&keys, "late");
        let (tx, stream) = stream_for(&[RELAY_A], FetchOptions::default());

        let sender = tokio::spawn(async move {
            tx.send(eose(RELAY_A)).unwrap();
            sleep(Duration::from_millis(900)).await;
            let _ = tx.send(deliver(RELAY_A, &late));
            sleep(Duration::from_secs(30)).await;
        });

        let outcome = stream.collect().await;
        assert!(outcome.is_empty());
        assert_eq!(outcome.stop, StopReason::Idle);
        sender.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_timeout_bounds_a_relay_that_never_finishes() {
        let keys = Keys::generate();
        let (tx, stream) = stream_for(&[RELAY_A], FetchOptions::default());

        let start = Instant::now();
        let sender = tokio::spawn(async move {
            for i in 0.. {
                if tx.send(deliver(RELAY_A, &event(&keys, &i.to_string()))).is_err() {
                    break;
                }
                sleep(Duration::from_millis(100)).await;
            }
        });

        let outcome = stream.collect().await;
        assert_eq!(outcome.stop, StopReason::HardTimeout);
        assert_elapsed(start, Duration::from_secs(8));
        assert_eq!(outcome.events.len(), 80);
        assert_eq!(outcome.eose_relays, 0);
        sender.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_the_query() {
        let cancel = CancellationToken::new();
        let (tx, stream) = stream_for(
            &[RELAY_A],
            FetchOptions::default().with_cancel(cancel.clone()),
        );

        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let outcome = stream.collect().await;
        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert_elapsed(start, Duration::from_secs(1));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_relays_arms_idle_immediately() {
        let (_tx, stream) = stream_for(&[], FetchOptions::default());

        let start = Instant::now();
        let outcome = stream.collect().await;
        assert_eq!(outcome.stop, StopReason::Idle);
        assert_eq!(outcome.relay_count, 0);
        assert_elapsed(start, Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_relay_counts_as_finished() {
        let (tx, mut stream) = stream_for(&[RELAY_A, RELAY_B], FetchOptions::default());

        tx.send(eose(RELAY_A)).unwrap();
        tx.send(SubscriptionUpdate::Disconnected {
            relay_url: RELAY_B.to_string(),
        })
        .unwrap();

        assert_eq!(stream.state(), SubscriptionState::Pending);
        assert!(stream.next().await.is_none());
        assert_eq!(stream.stop_reason(), Some(StopReason::Idle));
        assert_eq!(stream.state(), SubscriptionState::Closed);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_stops_with_closed() {
        let keys = Keys::generate();
        let only = event(&keys, "only");
        let (tx, stream) = stream_for(&[RELAY_A], FetchOptions::default());

        tx.send(deliver(RELAY_A, &only)).unwrap();
        drop(tx);

        let outcome = stream.collect().await;
        assert_eq!(outcome.events, vec![only]);
        assert_eq!(outcome.stop, StopReason::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_into_stream() {
        use futures::StreamExt;

        let keys = Keys::generate();
        let (tx, stream) = stream_for(&[RELAY_A], FetchOptions::default());
        tx.send(deliver(RELAY_A, &event(&keys, "a"))).unwrap();
        tx.send(deliver(RELAY_A, &event(&keys, "b"))).unwrap();
        tx.send(eose(RELAY_A)).unwrap();

        let events: Vec<Event> = stream.into_stream().collect().await;
        assert_eq!(events.len(), 2);
        drop(tx);
    }

    #[test]
    fn test_outcome_sorted_newest_first() {
        let keys = Keys::generate();
        let mut older = EventTemplate::new(1, "older");
        older.created_at = 100;
        let mut newer = EventTemplate::new(1, "newer");
        newer.created_at = 200;

        let outcome = FetchOutcome {
            events: vec![
                finalize_event(&older, keys.secret_key()).unwrap(),
                finalize_event(&newer, keys.secret_key()).unwrap(),
            ],
            stop: StopReason::Idle,
            eose_relays: 1,
            relay_count: 1,
        };
        let sorted = outcome.sorted();
        assert_eq!(sorted[0].content, "newer");
    }
}
