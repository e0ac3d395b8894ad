//! Scrobble Store
//!
//! The store is the durable event log plus the entity dictionaries (artists,
//! tracks) with normalized-name lookup. The read-side engine only talks to it
//! through the [`ScrobbleStore`] trait:
//!
//! - **types**: Core data structures (Scrobble, Track, TrackKey)
//! - **memory**: In-memory reference store with JSON snapshots
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Scrobble → resolve names → append (time-ordered) → first-seen index
//!
//! Read Path:
//!   Window → binary search → clone slice
//! ```

pub mod error;
pub mod memory;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use types::{normalize_name, Album, FirstSeen, Scrobble, Track, TrackKey};

use async_trait::async_trait;
use std::collections::HashMap;

/// Contract the read-side engine relies on
///
/// Implementations resolve incoming names to canonical entities on insert and
/// answer window and dictionary queries. Everything here may perform I/O.
#[async_trait]
pub trait ScrobbleStore: Send + Sync {
    /// Append a scrobble
    async fn insert(&self, scrobble: Scrobble) -> StoreResult<Scrobble>;

    /// All scrobbles with `since <= time < to`, oldest first
    async fn scrobbles_between(&self, since: i64, to: i64) -> StoreResult<Vec<Scrobble>>;

    /// Time of the earliest scrobble, if any
    async fn first_scrobble_time(&self) -> StoreResult<Option<i64>>;

    /// Canonical names of all known artists
    async fn artists(&self) -> StoreResult<Vec<String>>;

    /// All known tracks
    async fn tracks(&self) -> StoreResult<Vec<Track>>;

    /// Canonical artist for a name, by normalized lookup
    async fn find_artist(&self, name: &str) -> StoreResult<Option<String>>;

    /// Canonical track for a title and artist list, by normalized lookup
    async fn find_track(&self, title: &str, artists: &[String]) -> StoreResult<Option<Track>>;

    /// Count-as table: artist → artist it is credited to
    async fn credit_rules(&self) -> StoreResult<HashMap<String, String>>;

    /// Artist that `artist`'s plays are credited to, if any
    async fn credited_artist(&self, artist: &str) -> StoreResult<Option<String>>;

    /// Artists whose plays are credited to `artist`
    async fn associated_artists(&self, artist: &str) -> StoreResult<Vec<String>>;

    /// Whether `artist` is on the confirmed-real exclusion list
    async fn is_confirmed_real(&self, artist: &str) -> StoreResult<bool>;

    /// The confirmed-real exclusion list
    async fn confirmed_real(&self) -> StoreResult<Vec<String>>;

    /// First-ever scrobble time per artist and per track
    async fn first_seen(&self) -> StoreResult<FirstSeen>;
}
