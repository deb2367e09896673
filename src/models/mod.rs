//! Entity types synchronized by commentsync, and their sync bookkeeping.

mod comment;
mod metadata;
mod snapshot;
mod video;

pub use comment::Comment;
pub use metadata::{SyncMetadata, SyncableEntity, SCHEMA_VERSION};
pub use snapshot::{EntitySnapshot, EntityType};
pub use video::Video;
