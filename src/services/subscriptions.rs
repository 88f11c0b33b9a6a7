//! Real-time feeds of a game's score, events and stats for viewing contexts.
//!
//! A [`ViewerContext`] holds at most one subscription per [`Feed`]. Observing a feed
//! again replaces the previous subscription of that slot instead of stacking a new
//! one, and dropping the context cancels everything it holds.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use futures::{Stream, StreamExt, future};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::AbortHandle,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{
    dao::models::{LivePlayerStatsEntity, LiveScoreEntity},
    error::ServiceError,
    services::ledger::EventLedger,
    state::{Feed, SharedState, live::GameEvent},
};

/// Value carried by one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedValue {
    /// `None` until the game's live score exists.
    Score(Option<LiveScoreEntity>),
    /// Non-removed events, newest first.
    Events(Vec<GameEvent>),
    Stats(Vec<LivePlayerStatsEntity>),
}

impl FeedValue {
    /// Value shown when nothing could be loaded.
    pub fn empty(feed: Feed) -> Self {
        match feed {
            Feed::Score => FeedValue::Score(None),
            Feed::Events => FeedValue::Events(Vec::new()),
            Feed::Stats => FeedValue::Stats(Vec::new()),
        }
    }

    pub fn feed(&self) -> Feed {
        match self {
            FeedValue::Score(_) => Feed::Score,
            FeedValue::Events(_) => Feed::Events,
            FeedValue::Stats(_) => Feed::Stats,
        }
    }
}

/// Feed value tagged with the game it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUpdate {
    pub game_id: String,
    pub value: FeedValue,
}

/// Entry point handing out viewing contexts.
#[derive(Clone)]
pub struct SubscriptionManager {
    state: SharedState,
}

impl SubscriptionManager {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Fresh viewing context without any subscription.
    pub fn context(&self) -> ViewerContext {
        ViewerContext {
            state: self.state.clone(),
            slots: HashMap::new(),
        }
    }

    /// Number of feed subscriptions currently open for `game_id`.
    pub fn active_subscriptions(&self, game_id: &str) -> usize {
        self.state
            .active_feeds()
            .get(game_id)
            .map(|count| *count)
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct Slot {
    generation: Arc<AtomicU64>,
    task: Option<(String, AbortHandle)>,
}

impl Slot {
    /// Invalidate every stream handed out so far and stop the forwarding task.
    fn cancel(&mut self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some((_, task)) = self.task.take() {
            task.abort();
        }
        generation
    }
}

/// One viewing context, such as an open match screen or a client connection.
pub struct ViewerContext {
    state: SharedState,
    slots: HashMap<Feed, Slot>,
}

impl ViewerContext {
    /// Subscribe `feed` of `game_id`, replacing the previous subscription of that feed.
    ///
    /// The returned stream emits the current value first, then every change. It ends
    /// once the slot is observed again or released.
    pub fn observe(&mut self, feed: Feed, game_id: &str) -> FeedStream {
        let slot = self.slots.entry(feed).or_default();
        let generation = slot.cancel();

        let (tx, rx) = mpsc::channel(self.state.config().feed_buffer);
        let guard = ActiveFeedGuard::register(self.state.clone(), game_id);
        let task = tokio::spawn(pump(self.state.clone(), feed, game_id.to_owned(), tx, guard));
        slot.task = Some((game_id.to_owned(), task.abort_handle()));

        debug!(game_id, feed = feed.name(), generation, "feed subscription opened");
        FeedStream {
            rx: ReceiverStream::new(rx),
            generation: Arc::clone(&slot.generation),
            mine: generation,
        }
    }

    pub fn observe_score(
        &mut self,
        game_id: &str,
    ) -> impl Stream<Item = Option<LiveScoreEntity>> + Send + use<> {
        self.observe(Feed::Score, game_id)
            .filter_map(|update| {
                future::ready(match update.value {
                    FeedValue::Score(score) => Some(score),
                    _ => None,
                })
            })
    }

    pub fn observe_events(
        &mut self,
        game_id: &str,
    ) -> impl Stream<Item = Vec<GameEvent>> + Send + use<> {
        self.observe(Feed::Events, game_id)
            .filter_map(|update| {
                future::ready(match update.value {
                    FeedValue::Events(events) => Some(events),
                    _ => None,
                })
            })
    }

    pub fn observe_stats(
        &mut self,
        game_id: &str,
    ) -> impl Stream<Item = Vec<LivePlayerStatsEntity>> + Send + use<> {
        self.observe(Feed::Stats, game_id)
            .filter_map(|update| {
                future::ready(match update.value {
                    FeedValue::Stats(stats) => Some(stats),
                    _ => None,
                })
            })
    }

    /// Game currently observed by any slot of this context.
    pub fn current_game(&self) -> Option<&str> {
        self.slots
            .values()
            .find_map(|slot| slot.task.as_ref().map(|(game_id, _)| game_id.as_str()))
    }

    /// Cancel every subscription of the context.
    pub fn release(&mut self) {
        for slot in self.slots.values_mut() {
            slot.cancel();
        }
    }
}

impl Drop for ViewerContext {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stream side of a feed subscription.
pub struct FeedStream {
    rx: ReceiverStream<FeedUpdate>,
    generation: Arc<AtomicU64>,
    mine: u64,
}

impl FeedStream {
    fn is_stale(&self) -> bool {
        self.generation.load(Ordering::Acquire) != self.mine
    }
}

impl Stream for FeedStream {
    type Item = FeedUpdate;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.is_stale() {
            this.rx.close();
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.rx).poll_next(cx) {
            // Buffered values of a replaced subscription are dropped.
            Poll::Ready(Some(_)) if this.is_stale() => {
                this.rx.close();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

/// Keeps the per-game subscription count in sync with the forwarding task's lifetime.
struct ActiveFeedGuard {
    state: SharedState,
    game_id: String,
}

impl ActiveFeedGuard {
    fn register(state: SharedState, game_id: &str) -> Self {
        *state
            .active_feeds()
            .entry(game_id.to_owned())
            .or_insert(0) += 1;
        Self {
            state,
            game_id: game_id.to_owned(),
        }
    }
}

impl Drop for ActiveFeedGuard {
    fn drop(&mut self) {
        let now_empty = match self.state.active_feeds().get_mut(&self.game_id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };

        if now_empty {
            self.state
                .active_feeds()
                .remove_if(&self.game_id, |_, count| *count == 0);
        }
    }
}

/// Forward the current value of `feed`, then one value per relevant change.
async fn pump(
    state: SharedState,
    feed: Feed,
    game_id: String,
    tx: mpsc::Sender<FeedUpdate>,
    _guard: ActiveFeedGuard,
) {
    // Subscribe before the first fetch so no change between the two is missed.
    let mut changes = state.hub().subscribe(&game_id);
    let mut last = None;

    if !emit(&state, feed, &game_id, &tx, &mut last).await {
        return;
    }

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            change = changes.recv() => {
                let refresh = match change {
                    Ok(change) => change.touches(feed),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(
                            game_id = %game_id,
                            feed = feed.name(),
                            skipped,
                            "feed lagged; refetching"
                        );
                        true
                    }
                    Err(RecvError::Closed) => break,
                };

                if refresh && !emit(&state, feed, &game_id, &tx, &mut last).await {
                    break;
                }
            }
        }
    }

    debug!(game_id = %game_id, feed = feed.name(), "feed subscription closed");
}

/// Fetch and send the feed value unless it equals the last one sent.
///
/// Returns `false` once the consumer is gone.
async fn emit(
    state: &SharedState,
    feed: Feed,
    game_id: &str,
    tx: &mpsc::Sender<FeedUpdate>,
    last: &mut Option<FeedValue>,
) -> bool {
    let value = match fetch(state, feed, game_id).await {
        Ok(value) => value,
        Err(err) => {
            warn!(
                game_id,
                feed = feed.name(),
                error = %err,
                "feed refresh failed; keeping last known value"
            );
            last.clone().unwrap_or_else(|| FeedValue::empty(feed))
        }
    };

    if last.as_ref() == Some(&value) {
        return true;
    }

    *last = Some(value.clone());
    tx.send(FeedUpdate {
        game_id: game_id.to_owned(),
        value,
    })
    .await
    .is_ok()
}

async fn fetch(state: &SharedState, feed: Feed, game_id: &str) -> Result<FeedValue, ServiceError> {
    let backend = state.require_storage().await?;
    Ok(match feed {
        Feed::Score => FeedValue::Score(backend.live.find_live_score(game_id.to_owned()).await?),
        Feed::Events => FeedValue::Events(EventLedger::new(backend.live).list(game_id).await?),
        Feed::Stats => FeedValue::Stats(backend.live.list_player_stats(game_id.to_owned()).await?),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::time::timeout;

    use super::*;
    use crate::{
        dao::models::GameEventType,
        services::{
            live_session,
            testing::{Harness, goal_draft},
        },
        state::LiveChange,
    };

    const QUIET: Duration = Duration::from_millis(50);
    const WAIT: Duration = Duration::from_secs(2);

    async fn next<S: Stream + Unpin>(stream: &mut S) -> Option<S::Item> {
        timeout(WAIT, stream.next()).await.expect("stream stalled")
    }

    async fn stays_quiet<S: Stream + Unpin>(stream: &mut S) -> bool {
        timeout(QUIET, stream.next()).await.is_err()
    }

    async fn wait_for_count(manager: &SubscriptionManager, game_id: &str, expected: usize) {
        timeout(WAIT, async {
            while manager.active_subscriptions(game_id) != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription count settles");
    }

    #[tokio::test]
    async fn score_feed_emits_initial_value_then_changes() {
        let harness = Harness::live("g1").await;
        let manager = SubscriptionManager::new(harness.state.clone());
        let mut context = manager.context();
        let mut scores = Box::pin(context.observe_score("g1"));

        let initial = next(&mut scores).await.unwrap().unwrap();
        assert_eq!((initial.team1_score, initial.team2_score), (0, 0));

        live_session::add_event(&harness.state, "owner", goal_draft("g1", "p1", "A", 3))
            .await
            .unwrap();
        let updated = next(&mut scores).await.unwrap().unwrap();
        assert_eq!(updated.team1_score, 1);
    }

    #[tokio::test]
    async fn unrelated_changes_do_not_reach_the_score_feed() {
        let harness = Harness::live("g1").await;
        let manager = SubscriptionManager::new(harness.state.clone());
        let mut context = manager.context();
        let mut scores = Box::pin(context.observe_score("g1"));
        let mut events = Box::pin(context.observe_events("g1"));
        next(&mut scores).await.unwrap();
        assert!(next(&mut events).await.unwrap().is_empty());

        let save = goal_draft("g1", "p5", "B", 12);
        let save = crate::services::ledger::EventDraft {
            event_type: GameEventType::Save,
            ..save
        };
        let recorded = live_session::add_event(&harness.state, "owner", save)
            .await
            .unwrap();

        let listed = next(&mut events).await.unwrap();
        assert_eq!(listed, vec![recorded]);
        assert!(stays_quiet(&mut scores).await);
    }

    #[tokio::test]
    async fn observing_another_game_replaces_the_slot() {
        let harness = Harness::live("g1").await;
        let manager = SubscriptionManager::new(harness.state.clone());
        let mut context = manager.context();

        let mut first = context.observe(Feed::Score, "g1");
        next(&mut first).await.unwrap();
        wait_for_count(&manager, "g1", 1).await;

        let mut second = context.observe(Feed::Score, "g2");
        assert_eq!(next(&mut first).await, None);

        let initial = next(&mut second).await.unwrap();
        assert_eq!(initial.game_id, "g2");
        assert_eq!(initial.value, FeedValue::Score(None));
        assert_eq!(context.current_game(), Some("g2"));

        wait_for_count(&manager, "g1", 0).await;
        wait_for_count(&manager, "g2", 1).await;
    }

    #[tokio::test]
    async fn re_observing_the_same_game_delivers_once() {
        let harness = Harness::live("g1").await;
        let manager = SubscriptionManager::new(harness.state.clone());
        let mut context = manager.context();

        let mut stale = context.observe(Feed::Score, "g1");
        let mut fresh = context.observe(Feed::Score, "g1");

        assert_eq!(next(&mut stale).await, None);
        assert!(matches!(
            next(&mut fresh).await.unwrap().value,
            FeedValue::Score(Some(_))
        ));

        live_session::add_event(&harness.state, "owner", goal_draft("g1", "p1", "A", 1))
            .await
            .unwrap();
        assert!(next(&mut fresh).await.is_some());
        assert!(stays_quiet(&mut fresh).await);
        wait_for_count(&manager, "g1", 1).await;
    }

    #[tokio::test]
    async fn dropping_the_context_cancels_every_feed() {
        let harness = Harness::live("g1").await;
        let manager = SubscriptionManager::new(harness.state.clone());
        let mut context = manager.context();

        let mut streams: Vec<FeedStream> = Feed::ALL
            .iter()
            .map(|feed| context.observe(*feed, "g1"))
            .collect();
        wait_for_count(&manager, "g1", 3).await;

        drop(context);
        for stream in &mut streams {
            assert_eq!(next(stream).await, None);
        }
        wait_for_count(&manager, "g1", 0).await;
    }

    #[tokio::test]
    async fn fetch_errors_fall_back_to_empty_then_recover() {
        let harness = Harness::live("g1").await;
        let manager = SubscriptionManager::new(harness.state.clone());
        let mut context = manager.context();

        harness.store.set_unavailable(true);
        let mut stats = Box::pin(context.observe_stats("g1"));
        assert!(next(&mut stats).await.unwrap().is_empty());

        harness.store.set_unavailable(false);
        live_session::add_event(&harness.state, "owner", goal_draft("g1", "p1", "A", 1))
            .await
            .unwrap();
        let lines = next(&mut stats).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].goals, 1);
    }

    #[tokio::test]
    async fn fetch_errors_after_delivery_keep_the_stream_alive() {
        let harness = Harness::live("g1").await;
        let manager = SubscriptionManager::new(harness.state.clone());
        let mut context = manager.context();
        let mut scores = Box::pin(context.observe_score("g1"));
        next(&mut scores).await.unwrap();

        harness.store.set_unavailable(true);
        harness.state.hub().publish("g1", LiveChange::ALL);
        assert!(stays_quiet(&mut scores).await);

        harness.store.set_unavailable(false);
        live_session::add_event(&harness.state, "owner", goal_draft("g1", "p1", "A", 1))
            .await
            .unwrap();
        assert_eq!(next(&mut scores).await.unwrap().unwrap().team1_score, 1);
    }

    #[tokio::test]
    async fn release_ends_streams_without_error() {
        let harness = Harness::live("g1").await;
        let manager = SubscriptionManager::new(harness.state.clone());
        let mut context = manager.context();
        let mut events = context.observe(Feed::Events, "g1");

        context.release();
        assert_eq!(next(&mut events).await, None);
        assert_eq!(context.current_game(), None);
        wait_for_count(&manager, "g1", 0).await;
    }
}
