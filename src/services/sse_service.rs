use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt, stream::select_all};
use tracing::{info, warn};

use crate::{
    dto::ws::ViewerOutboundMessage,
    services::subscriptions::{FeedUpdate, SubscriptionManager},
    state::{Feed, SharedState},
};

/// Stream every feed of `game_id` as named SSE events until the client disconnects.
///
/// The connection owns one viewing context; dropping the response stream releases it.
pub fn game_stream(
    state: &SharedState,
    game_id: &str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let mut context = SubscriptionManager::new(state.clone()).context();
    let feeds = select_all(Feed::ALL.map(|feed| context.observe(feed, game_id)));
    let game_id = game_id.to_owned();

    let stream = async_stream::stream! {
        let _context = context;
        let mut feeds = feeds;
        while let Some(update) = feeds.next().await {
            if let Some(event) = to_event(update) {
                yield Ok(event);
            }
        }
        info!(game_id = %game_id, "game SSE stream ended");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.config().sse_keep_alive)
            .text("keep-alive"),
    )
}

/// Render a feed update as an SSE event named after its feed.
fn to_event(update: FeedUpdate) -> Option<Event> {
    let name = update.value.feed().name();
    match Event::default()
        .event(name)
        .json_data(ViewerOutboundMessage::from(update))
    {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, feed = name, "failed to serialize feed update");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::subscriptions::FeedValue;

    #[test]
    fn feed_updates_become_named_events() {
        let event = to_event(FeedUpdate {
            game_id: "g1".into(),
            value: FeedValue::Events(Vec::new()),
        });
        assert!(event.is_some());
    }
}
