use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::info;

use crate::dao::models::{LivePlayerStatsEntity, LiveScoreEntity};

/// Failures reported by a badge awarder. Logged by the caller, never surfaced.
#[derive(Debug, Error)]
pub enum BadgeError {
    #[cfg(feature = "badge-webhook")]
    #[error("badge webhook request to `{url}` failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("badge webhook `{url}` answered with status {status}")]
    Rejected { url: String, status: u16 },
    #[error("badge evaluation unavailable: {0}")]
    Unavailable(String),
    #[error("badge evaluation did not answer within {0:?}")]
    TimedOut(Duration),
}

/// Game handed to badge evaluation once its score is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedGame {
    pub score: LiveScoreEntity,
}

/// Downstream consumer of final game statistics.
pub trait BadgeAwarder: Send + Sync {
    /// Called once per finished game with the final stat lines.
    fn on_game_finished(
        &self,
        game: FinishedGame,
        final_stats: Vec<LivePlayerStatsEntity>,
    ) -> BoxFuture<'static, Result<(), BadgeError>>;
}

/// Awarder that only records the hand-off in the logs.
#[derive(Debug, Clone, Default)]
pub struct LoggingBadgeAwarder;

impl BadgeAwarder for LoggingBadgeAwarder {
    fn on_game_finished(
        &self,
        game: FinishedGame,
        final_stats: Vec<LivePlayerStatsEntity>,
    ) -> BoxFuture<'static, Result<(), BadgeError>> {
        Box::pin(async move {
            info!(
                game_id = %game.score.game_id,
                team1_score = game.score.team1_score,
                team2_score = game.score.team2_score,
                players = final_stats.len(),
                "game finished; badge evaluation requested"
            );
            Ok(())
        })
    }
}

#[cfg(feature = "badge-webhook")]
pub use self::webhook::WebhookBadgeAwarder;

#[cfg(feature = "badge-webhook")]
mod webhook {
    use std::{sync::Arc, time::Duration};

    use futures::future::BoxFuture;
    use reqwest::Client;
    use serde::Serialize;
    use tracing::debug;

    use super::{BadgeAwarder, BadgeError, FinishedGame};
    use crate::{
        dao::models::LivePlayerStatsEntity,
        dto::live::{LiveScoreDto, PlayerStatsDto},
    };

    #[derive(Serialize)]
    struct BadgeWebhookPayload {
        game_id: String,
        score: LiveScoreDto,
        final_stats: Vec<PlayerStatsDto>,
    }

    /// Awarder that POSTs the final stats to an external badge service.
    #[derive(Clone)]
    pub struct WebhookBadgeAwarder {
        client: Client,
        url: Arc<str>,
    }

    impl WebhookBadgeAwarder {
        /// Awarder posting to `url`; each request gives up after `timeout`.
        pub fn new(url: impl Into<Arc<str>>, timeout: Duration) -> Result<Self, BadgeError> {
            let url = url.into();
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|source| BadgeError::Request {
                    url: url.to_string(),
                    source,
                })?;
            Ok(Self { client, url })
        }

        async fn post(
            &self,
            game: FinishedGame,
            final_stats: Vec<LivePlayerStatsEntity>,
        ) -> Result<(), BadgeError> {
            let payload = BadgeWebhookPayload {
                game_id: game.score.game_id.clone(),
                score: LiveScoreDto::from(&game.score),
                final_stats: final_stats.iter().map(PlayerStatsDto::from).collect(),
            };

            let response = self
                .client
                .post(self.url.as_ref())
                .json(&payload)
                .send()
                .await
                .map_err(|source| BadgeError::Request {
                    url: self.url.to_string(),
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(BadgeError::Rejected {
                    url: self.url.to_string(),
                    status: status.as_u16(),
                });
            }

            debug!(game_id = %payload.game_id, "badge webhook accepted final stats");
            Ok(())
        }
    }

    impl BadgeAwarder for WebhookBadgeAwarder {
        fn on_game_finished(
            &self,
            game: FinishedGame,
            final_stats: Vec<LivePlayerStatsEntity>,
        ) -> BoxFuture<'static, Result<(), BadgeError>> {
            let awarder = self.clone();
            Box::pin(async move { awarder.post(game, final_stats).await })
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use futures::future::BoxFuture;

    use super::{BadgeAwarder, BadgeError, FinishedGame};
    use crate::dao::models::LivePlayerStatsEntity;

    /// Awarder that keeps every call for assertions.
    #[derive(Clone, Default)]
    pub struct RecordingBadgeAwarder {
        calls: Arc<Mutex<Vec<(FinishedGame, Vec<LivePlayerStatsEntity>)>>>,
        fail: bool,
        stall: bool,
    }

    impl RecordingBadgeAwarder {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        /// Awarder whose evaluation never completes.
        pub fn stalling() -> Self {
            Self {
                stall: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<(FinishedGame, Vec<LivePlayerStatsEntity>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BadgeAwarder for RecordingBadgeAwarder {
        fn on_game_finished(
            &self,
            game: FinishedGame,
            final_stats: Vec<LivePlayerStatsEntity>,
        ) -> BoxFuture<'static, Result<(), BadgeError>> {
            self.calls.lock().unwrap().push((game, final_stats));
            let (fail, stall) = (self.fail, self.stall);
            Box::pin(async move {
                if stall {
                    futures::future::pending::<()>().await;
                }
                if fail {
                    Err(BadgeError::Unavailable("scripted failure".into()))
                } else {
                    Ok(())
                }
            })
        }
    }
}
