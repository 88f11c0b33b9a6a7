/// Pure derivation of scores and stat lines from ledger events.
pub mod aggregator;
/// Hand-off of final stats to badge evaluation.
pub mod badges;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Append-only event ledger with soft deletes.
pub mod ledger;
/// Status and permission gate shared by every live operation.
pub mod lifecycle;
/// Live match operations: start, record, remove, finish, repair.
pub mod live_session;
/// Game SSE stream assembly.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Per-context real-time feeds.
pub mod subscriptions;
/// Live viewer WebSocket handling.
pub mod websocket_service;

#[cfg(test)]
pub(crate) mod testing;
