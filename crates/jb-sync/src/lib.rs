//! # jb-sync
//!
//! The orchestration layer for Jokebox: it coordinates the local cache and
//! the remote stores behind the core traits and publishes the results.

pub mod feed;
pub mod gateway;
pub mod images;
pub mod profiles;
pub mod reactions;
pub mod state;

pub use feed::{JokeSyncService, DEFAULT_PAGE_SIZE};
pub use gateway::{JokePage, ReactionTarget, RemoteGateway};
pub use images::ImageService;
pub use profiles::{ProfileService, ProfileUpdate};
pub use reactions::{ReactionService, ReactionSource};
pub use state::{FeedState, FetchOutcome, Optimistic, ReactionSession};
