use dashmap::DashMap;
use tokio::sync::broadcast;

/// The three live feeds a viewer can observe for a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Score,
    Events,
    Stats,
}

impl Feed {
    pub const ALL: [Feed; 3] = [Feed::Score, Feed::Events, Feed::Stats];

    /// Name used for SSE event types and WebSocket message tags.
    pub fn name(self) -> &'static str {
        match self {
            Feed::Score => "score",
            Feed::Events => "events",
            Feed::Stats => "stats",
        }
    }
}

/// Which feeds of a game a mutation touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveChange {
    pub score: bool,
    pub events: bool,
    pub stats: bool,
}

impl LiveChange {
    pub const ALL: LiveChange = LiveChange {
        score: true,
        events: true,
        stats: true,
    };

    pub fn score_only() -> Self {
        Self {
            score: true,
            ..Self::default()
        }
    }

    pub fn events_only() -> Self {
        Self {
            events: true,
            ..Self::default()
        }
    }

    pub fn touches(&self, feed: Feed) -> bool {
        match feed {
            Feed::Score => self.score,
            Feed::Events => self.events,
            Feed::Stats => self.stats,
        }
    }
}

/// Per-game broadcast of [`LiveChange`] notifications.
pub struct LiveHub {
    channels: DashMap<String, broadcast::Sender<LiveChange>>,
    capacity: usize,
}

impl LiveHub {
    /// Construct a hub whose per-game channels buffer `capacity` notifications.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a receiver for subsequent changes of `game_id`.
    pub fn subscribe(&self, game_id: &str) -> broadcast::Receiver<LiveChange> {
        self.channels
            .entry(game_id.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Notify every receiver of `game_id`; channels nobody listens to are dropped.
    pub fn publish(&self, game_id: &str, change: LiveChange) {
        let delivered = match self.channels.get(game_id) {
            Some(sender) => sender.send(change).is_ok(),
            None => return,
        };

        if !delivered {
            self.channels
                .remove_if(game_id, |_, sender| sender.receiver_count() == 0);
        }
    }

    /// Number of games with a live channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscribers_of_the_same_game_only() {
        let hub = LiveHub::new(4);
        let mut g1 = hub.subscribe("g1");
        let mut g2 = hub.subscribe("g2");

        hub.publish("g1", LiveChange::score_only());

        assert_eq!(g1.recv().await.unwrap(), LiveChange::score_only());
        assert!(g2.try_recv().is_err());
    }

    #[test]
    fn channels_without_receivers_are_pruned() {
        let hub = LiveHub::new(4);
        let receiver = hub.subscribe("g1");
        assert_eq!(hub.channel_count(), 1);

        drop(receiver);
        hub.publish("g1", LiveChange::ALL);
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn publishing_to_unknown_game_is_a_no_op() {
        let hub = LiveHub::new(4);
        hub.publish("nobody", LiveChange::ALL);
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn change_reports_touched_feeds() {
        let change = LiveChange::score_only();
        assert!(change.touches(Feed::Score));
        assert!(!change.touches(Feed::Events));
        assert!(Feed::ALL.iter().all(|feed| LiveChange::ALL.touches(*feed)));
    }
}
