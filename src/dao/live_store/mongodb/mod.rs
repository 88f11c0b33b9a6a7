mod config;
mod connection;
mod directory;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoLiveStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Decode { id, reason } => StorageError::corrupt(id, reason),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
