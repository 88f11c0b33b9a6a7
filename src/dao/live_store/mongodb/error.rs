use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Failures that can occur while talking to MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to write event `{id}`")]
    SaveEvent {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load event `{id}`")]
    LoadEvent {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load events of game `{game_id}`")]
    LoadEvents {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to write live score of game `{game_id}`")]
    SaveScore {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load live score of game `{game_id}`")]
    LoadScore {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to write player stats of game `{game_id}`")]
    SaveStats {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load player stats of game `{game_id}`")]
    LoadStats {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game `{game_id}`")]
    LoadGame {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update game `{game_id}`")]
    SaveGame {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load confirmation `{id}`")]
    LoadConfirmation {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("document `{id}` does not match the expected schema: {reason}")]
    Decode { id: String, reason: String },
}

/// Whether the error is a unique index violation.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}
