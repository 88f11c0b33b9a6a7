/// External collaborators consulted by the live subsystem (confirmations, game status).
pub mod directory;
/// Event ledger and live aggregate persistence.
pub mod live_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
