//! Lead session
//!
//! Owns one store and the background tasks that keep it in sync: the
//! polling fetch (its first tick is the bootstrap), the change feed loop
//! with reconnect backoff, and the notification emitter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::{Config, ConfigError, StatsConfig, SyncConfig};
use crate::notify::{Notification, NotificationEmitter};
use crate::realtime::{ChangeFeed, FeedEvent, RealtimeSubscriber};
use crate::remote::{LeadSource, RestClient};
use crate::stats::StatsReport;
use crate::store::{LeadStore, Snapshot, StoreEvent};

const NOTIFICATION_CAPACITY: usize = 64;

/// Connectivity as seen by the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// The last fetch reached the backend
    pub connected: bool,
    /// The change feed is joined
    pub feed_connected: bool,
    /// The first fetch has seeded the store
    pub bootstrapped: bool,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// A running sync session
pub struct LeadSession {
    store: Arc<LeadStore>,
    status: Arc<watch::Sender<SessionStatus>>,
    notifications: broadcast::Sender<Notification>,
    stats: StatsConfig,
    has_feed: bool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LeadSession {
    /// Build the backend clients from configuration and open a session
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let source: Arc<dyn LeadSource> = Arc::new(RestClient::from_config(config)?);
        let feed: Option<Arc<dyn ChangeFeed>> = if config.sync.realtime_enabled {
            Some(Arc::new(RealtimeSubscriber::from_config(config)?))
        } else {
            None
        };

        Ok(Self::open(source, feed, &config.sync, config.stats.clone()))
    }

    /// Start syncing; must be called from within a Tokio runtime
    pub fn open(
        source: Arc<dyn LeadSource>,
        feed: Option<Arc<dyn ChangeFeed>>,
        sync: &SyncConfig,
        stats: StatsConfig,
    ) -> Self {
        let store = Arc::new(LeadStore::new());
        let (status, _) = watch::channel(SessionStatus::default());
        let status = Arc::new(status);
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        // Subscribe before anything can mutate the store
        let emitter = NotificationEmitter::new().run(store.subscribe(), notifications.clone());
        let mut tasks = vec![tokio::spawn(emitter)];
        let has_feed = feed.is_some();

        tasks.push(tokio::spawn(poll_loop(
            source,
            store.clone(),
            status.clone(),
            sync.clone(),
        )));

        if let Some(feed) = feed {
            tasks.push(tokio::spawn(feed_loop(
                feed,
                store.clone(),
                status.clone(),
                sync.clone(),
            )));
        }

        tracing::info!(
            poll_interval_ms = sync.poll_interval_ms,
            realtime = has_feed,
            "Lead session opened"
        );

        Self {
            store,
            status,
            notifications,
            stats,
            has_feed,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn store(&self) -> &Arc<LeadStore> {
        &self.store
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.store.watch()
    }

    pub fn changes(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Whether a change feed was configured for this session
    pub fn has_feed(&self) -> bool {
        self.has_feed
    }

    pub fn stats_config(&self) -> &StatsConfig {
        &self.stats
    }

    /// Stats over the current snapshot
    pub fn stats(&self, now: DateTime<Utc>) -> StatsReport {
        StatsReport::compute(self.store.snapshot().leads(), now, &self.stats)
    }

    /// Stop every task and drop the session's data
    ///
    /// Waits for the aborted tasks to finish, so a fetch that was completing
    /// on another worker cannot repopulate the store after it is cleared.
    pub async fn close(&self) {
        let handles = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if handles.is_empty() {
            return;
        }

        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "Session task panicked");
                }
            }
        }
        self.store.clear();
        self.status.send_replace(SessionStatus::default());
        tracing::info!("Lead session closed");
    }
}

/// Abort-only fallback for sessions dropped without `close`
impl Drop for LeadSession {
    fn drop(&mut self) {
        let tasks = match self.tasks.get_mut() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }
}

/// Fetch on every tick; the first tick fires immediately and seeds the store
async fn poll_loop(
    source: Arc<dyn LeadSource>,
    store: Arc<LeadStore>,
    status: Arc<watch::Sender<SessionStatus>>,
    sync: SyncConfig,
) {
    let mut interval = tokio::time::interval(sync.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match source.fetch_all().await {
            Ok(leads) => {
                let event = store.replace_all(leads);
                let fetched_at = Utc::now();
                status.send_modify(|s| {
                    if !s.bootstrapped {
                        tracing::info!(?event, "Initial lead fetch complete");
                    }
                    s.connected = true;
                    s.bootstrapped = true;
                    s.last_fetch_at = Some(fetched_at);
                    s.last_error = None;
                });
                tracing::debug!(?event, "Lead fetch applied");
            }
            Err(e) => {
                // Keep the previous snapshot and try again next tick
                tracing::warn!(error = %e, "Lead fetch failed");
                status.send_modify(|s| {
                    s.connected = false;
                    s.last_error = Some(e.to_string());
                });
            }
        }
    }
}

/// Keep a change feed subscription alive, applying events in arrival order
async fn feed_loop(
    feed: Arc<dyn ChangeFeed>,
    store: Arc<LeadStore>,
    status: Arc<watch::Sender<SessionStatus>>,
    sync: SyncConfig,
) {
    let mut attempt: u32 = 0;

    loop {
        match feed.subscribe().await {
            Ok(mut subscription) => {
                while let Some(event) = subscription.next().await {
                    match event {
                        FeedEvent::Connected => {
                            tracing::debug!("Change feed joined");
                            attempt = 0;
                            status.send_modify(|s| s.feed_connected = true);
                        }
                        FeedEvent::Change(change) => {
                            let id = change.id().clone();
                            match store.apply(change) {
                                Some(applied) => tracing::debug!(?applied, "Change applied"),
                                None => tracing::debug!(%id, "Change had no effect"),
                            }
                        }
                        FeedEvent::Disconnected(reason) => {
                            tracing::debug!(%reason, "Change feed ended");
                            break;
                        }
                    }
                }
                status.send_modify(|s| s.feed_connected = false);
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "Change feed subscription failed");
            }
        }

        let delay = sync.reconnect_delay(attempt);
        attempt = attempt.saturating_add(1);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnecting change feed");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::{Lead, LeadId, LeadSchema};
    use crate::realtime::{ChangeEvent, Subscription, SubscriptionError};
    use crate::remote::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn lead(id: i64, day: u32) -> Lead {
        Lead::from_row(
            json!({"id": id, "created_at": format!("2024-03-{:02}T10:00:00Z", day)}),
            &LeadSchema::default(),
        )
        .unwrap()
    }

    /// Replays scripted fetch results, repeating the last one
    struct ScriptedSource {
        results: Mutex<VecDeque<Result<Vec<Lead>, String>>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<Vec<Lead>, String>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
            })
        }
    }

    #[async_trait]
    impl LeadSource for ScriptedSource {
        async fn fetch_all(&self) -> Result<Vec<Lead>, TransportError> {
            let mut results = self.results.lock().unwrap();
            let next = if results.len() > 1 {
                results.pop_front().unwrap()
            } else {
                results.front().cloned().unwrap()
            };
            next.map_err(TransportError::Unavailable)
        }
    }

    /// Signals when a fetch starts, then finishes it without yielding
    struct SlowSource {
        started: Arc<tokio::sync::Notify>,
        leads: Vec<Lead>,
    }

    #[async_trait]
    impl LeadSource for SlowSource {
        async fn fetch_all(&self) -> Result<Vec<Lead>, TransportError> {
            self.started.notify_one();
            std::thread::sleep(Duration::from_millis(100));
            Ok(self.leads.clone())
        }
    }

    /// Hands out pre-built subscriptions, then refuses
    struct ScriptedFeed {
        subscriptions: Mutex<VecDeque<mpsc::UnboundedReceiver<FeedEvent>>>,
        attempts: Mutex<usize>,
    }

    impl ScriptedFeed {
        fn new(receivers: Vec<mpsc::UnboundedReceiver<FeedEvent>>) -> Arc<Self> {
            Arc::new(Self {
                subscriptions: Mutex::new(receivers.into()),
                attempts: Mutex::new(0),
            })
        }

        fn attempts(&self) -> usize {
            *self.attempts.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChangeFeed for ScriptedFeed {
        async fn subscribe(&self) -> Result<Subscription, SubscriptionError> {
            *self.attempts.lock().unwrap() += 1;
            match self.subscriptions.lock().unwrap().pop_front() {
                Some(rx) => Ok(Subscription::from_receiver(rx)),
                None => Err(SubscriptionError::Connect("refused".to_string())),
            }
        }
    }

    fn sync_config() -> SyncConfig {
        SyncConfig {
            poll_interval_ms: 60_000,
            reconnect_delay_ms: 10,
            max_reconnect_delay_ms: 20,
            ..SyncConfig::default()
        }
    }

    async fn wait_for<F>(session: &LeadSession, mut ready: F)
    where
        F: FnMut(&SessionStatus, &Snapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if ready(&session.status(), &session.snapshot()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session never reached the expected state");
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_store() {
        let source = ScriptedSource::new(vec![Ok(vec![lead(1, 1), lead(2, 2)])]);
        let session = LeadSession::open(source, None, &sync_config(), StatsConfig::default());

        wait_for(&session, |status, _| status.bootstrapped).await;

        let status = session.status();
        assert!(status.connected);
        assert!(!status.feed_connected);
        assert!(status.last_fetch_at.is_some());

        let ids: Vec<String> = session.snapshot().ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, ["2", "1"]);
        assert_eq!(session.stats(Utc::now()).stats.total, 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_snapshot() {
        let source = ScriptedSource::new(vec![
            Ok(vec![lead(1, 1)]),
            Err("connection refused".to_string()),
        ]);
        let sync = SyncConfig {
            poll_interval_ms: 10,
            ..sync_config()
        };
        let session = LeadSession::open(source, None, &sync, StatsConfig::default());

        wait_for(&session, |status, _| {
            status.bootstrapped && status.last_error.is_some()
        })
        .await;

        let status = session.status();
        assert!(!status.connected);
        assert_eq!(session.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_feed_events_reach_store_and_notify() {
        let source = ScriptedSource::new(vec![Ok(vec![lead(1, 1)])]);
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = ScriptedFeed::new(vec![rx]);

        let session = LeadSession::open(source, Some(feed), &sync_config(), StatsConfig::default());
        let mut notifications = session.notifications();
        wait_for(&session, |status, _| status.bootstrapped).await;

        tx.send(FeedEvent::Connected).unwrap();
        tx.send(FeedEvent::Change(ChangeEvent::Insert(lead(2, 2))))
            .unwrap();
        wait_for(&session, |status, snapshot| {
            status.feed_connected && snapshot.len() == 2
        })
        .await;

        let notification = tokio::time::timeout(Duration::from_secs(1), notifications.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.count, 1);

        tx.send(FeedEvent::Change(ChangeEvent::Delete(LeadId::from(1))))
            .unwrap();
        wait_for(&session, |_, snapshot| snapshot.len() == 1).await;
    }

    #[tokio::test]
    async fn test_feed_reconnects_after_disconnect() {
        let source = ScriptedSource::new(vec![Ok(vec![])]);
        let (first_tx, first_rx) = mpsc::unbounded_channel();
        let (second_tx, second_rx) = mpsc::unbounded_channel();
        let feed = ScriptedFeed::new(vec![first_rx, second_rx]);

        let session = LeadSession::open(
            source,
            Some(feed.clone()),
            &sync_config(),
            StatsConfig::default(),
        );

        first_tx.send(FeedEvent::Connected).unwrap();
        wait_for(&session, |status, _| status.feed_connected).await;

        first_tx
            .send(FeedEvent::Disconnected("socket closed".to_string()))
            .unwrap();
        wait_for(&session, |status, _| !status.feed_connected).await;

        second_tx.send(FeedEvent::Connected).unwrap();
        wait_for(&session, |status, _| status.feed_connected).await;
        assert_eq!(feed.attempts(), 2);
    }

    #[tokio::test]
    async fn test_failed_subscribe_is_retried() {
        let source = ScriptedSource::new(vec![Ok(vec![])]);
        let feed = ScriptedFeed::new(vec![]);

        let session = LeadSession::open(
            source,
            Some(feed.clone()),
            &sync_config(),
            StatsConfig::default(),
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while feed.attempts() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        session.close().await;
    }

    #[tokio::test]
    async fn test_close_clears_and_stops() {
        let source = ScriptedSource::new(vec![Ok(vec![lead(1, 1)])]);
        let (_tx, rx) = mpsc::unbounded_channel();
        let feed = ScriptedFeed::new(vec![rx]);
        let session = LeadSession::open(source, Some(feed.clone()), &sync_config(), StatsConfig::default());

        wait_for(&session, |status, _| status.bootstrapped).await;
        session.close().await;

        assert!(session.snapshot().is_empty());
        assert_eq!(session.status(), SessionStatus::default());

        // Closing twice is harmless
        session.close().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(feed.attempts(), 1);
        assert!(session.snapshot().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_waits_for_fetch_in_progress() {
        let started = Arc::new(tokio::sync::Notify::new());
        let source = Arc::new(SlowSource {
            started: started.clone(),
            leads: vec![lead(1, 1)],
        });
        let session = LeadSession::open(source, None, &sync_config(), StatsConfig::default());

        // The fetch is past its last await point when close starts
        started.notified().await;
        session.close().await;

        assert!(session.snapshot().is_empty());
        assert_eq!(session.status(), SessionStatus::default());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(session.snapshot().is_empty());
        assert!(!session.status().bootstrapped);
    }
}
