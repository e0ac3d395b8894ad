//! In-memory scrobble store
//!
//! Reference implementation of [`ScrobbleStore`]. Scrobbles are kept in a
//! time-ordered `Vec` so window queries are two binary searches. Entity
//! dictionaries and the first-seen index are rebuilt from the scrobble log when
//! a snapshot is loaded.
//!
//! Thread-safe via Tokio's async RwLock for concurrent access.

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::{normalize_name, FirstSeen, Scrobble, Track, TrackKey};
use crate::store::ScrobbleStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tokio::sync::RwLock;

/// On-disk snapshot format
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    scrobbles: Vec<Scrobble>,
    /// Count-as rules keyed by canonical artist name
    #[serde(default)]
    credits: BTreeMap<String, String>,
    #[serde(default)]
    confirmed_real: BTreeSet<String>,
}

/// Internal state for the store
#[derive(Debug, Default)]
struct StoreState {
    /// Sorted by time; equal times keep insertion order
    scrobbles: Vec<Scrobble>,
    /// Normalized name → canonical name
    artists: BTreeMap<String, String>,
    tracks: BTreeMap<TrackKey, Track>,
    /// Normalized artist → canonical credited artist
    credits: HashMap<String, String>,
    /// Normalized names
    confirmed_real: BTreeSet<String>,
    first_seen: FirstSeen,
}

impl StoreState {
    fn resolve_artist(&mut self, raw: &str) -> String {
        let name = raw.trim();
        self.artists
            .entry(normalize_name(name))
            .or_insert_with(|| name.to_string())
            .clone()
    }

    fn lookup_artist(&self, raw: &str) -> Option<&String> {
        self.artists.get(&normalize_name(raw.trim()))
    }

    /// Map names to canonical entities and append
    fn append(&mut self, mut scrobble: Scrobble) -> StoreResult<Scrobble> {
        if scrobble.track.title.trim().is_empty() {
            return Err(StoreError::InvalidScrobble("empty title".to_string()));
        }
        if scrobble.track.artists.iter().all(|a| a.trim().is_empty()) {
            return Err(StoreError::InvalidScrobble("no artists".to_string()));
        }

        let mut artists: Vec<String> = Vec::with_capacity(scrobble.track.artists.len());
        for raw in scrobble.track.artists.iter().filter(|a| !a.trim().is_empty()) {
            let canonical = self.resolve_artist(raw);
            if !artists.contains(&canonical) {
                artists.push(canonical);
            }
        }
        scrobble.track.artists = artists;
        scrobble.track.title = scrobble.track.title.trim().to_string();

        if let Some(album) = scrobble.track.album.as_mut() {
            let album_artists: Vec<String> = album.artists.clone();
            album.artists = album_artists
                .iter()
                .filter(|a| !a.trim().is_empty())
                .map(|a| self.resolve_artist(a))
                .collect();
        }

        let key = scrobble.track.key();
        let track = self
            .tracks
            .entry(key)
            .or_insert_with(|| scrobble.track.clone())
            .clone();
        scrobble.track = track;

        self.first_seen.observe(&scrobble);

        let pos = self.scrobbles.partition_point(|s| s.time <= scrobble.time);
        self.scrobbles.insert(pos, scrobble.clone());
        Ok(scrobble)
    }

    fn window(&self, since: i64, to: i64) -> &[Scrobble] {
        if since >= to {
            return &[];
        }
        let start = self.scrobbles.partition_point(|s| s.time < since);
        let end = self.scrobbles.partition_point(|s| s.time < to);
        &self.scrobbles[start..end]
    }
}

/// In-memory [`ScrobbleStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON snapshot; a missing file yields an empty store
    pub async fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;

        let store = Self::new();
        {
            let mut state = store.state.write().await;
            for scrobble in snapshot.scrobbles {
                state.append(scrobble).map_err(|e| {
                    StoreError::Corruption(format!("snapshot {:?}: {}", path, e))
                })?;
            }
            for (artist, credited) in snapshot.credits {
                let target = state.resolve_artist(&credited);
                state.credits.insert(normalize_name(&artist), target);
            }
            state.confirmed_real = snapshot
                .confirmed_real
                .iter()
                .map(|a| normalize_name(a))
                .collect();
        }

        tracing::info!(
            "Loaded {} scrobbles from {:?}",
            store.len().await,
            path
        );
        Ok(store)
    }

    /// Save a JSON snapshot
    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let snapshot = {
            let state = self.state.read().await;
            let credits = state
                .credits
                .iter()
                .map(|(from, to)| {
                    let from = state.artists.get(from).cloned().unwrap_or_else(|| from.clone());
                    (from, to.clone())
                })
                .collect();
            let confirmed_real = state
                .confirmed_real
                .iter()
                .map(|a| state.artists.get(a).cloned().unwrap_or_else(|| a.clone()))
                .collect();
            Snapshot {
                scrobbles: state.scrobbles.clone(),
                credits,
                confirmed_real,
            }
        };

        let content = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Credit all of `artist`'s plays to `credited` (a count-as rule)
    pub async fn add_credit_rule(&self, artist: &str, credited: &str) {
        let mut state = self.state.write().await;
        let target = state.resolve_artist(credited);
        state.credits.insert(normalize_name(artist.trim()), target);
    }

    /// Put `artist` on the confirmed-real exclusion list
    pub async fn confirm_real(&self, artist: &str) {
        let mut state = self.state.write().await;
        state.confirmed_real.insert(normalize_name(artist.trim()));
    }

    /// Number of stored scrobbles
    pub async fn len(&self) -> usize {
        self.state.read().await.scrobbles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ScrobbleStore for MemoryStore {
    async fn insert(&self, scrobble: Scrobble) -> StoreResult<Scrobble> {
        let mut state = self.state.write().await;
        state.append(scrobble)
    }

    async fn scrobbles_between(&self, since: i64, to: i64) -> StoreResult<Vec<Scrobble>> {
        let state = self.state.read().await;
        Ok(state.window(since, to).to_vec())
    }

    async fn first_scrobble_time(&self) -> StoreResult<Option<i64>> {
        let state = self.state.read().await;
        Ok(state.scrobbles.first().map(|s| s.time))
    }

    async fn artists(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.artists.values().cloned().collect())
    }

    async fn tracks(&self) -> StoreResult<Vec<Track>> {
        let state = self.state.read().await;
        Ok(state.tracks.values().cloned().collect())
    }

    async fn find_artist(&self, name: &str) -> StoreResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state.lookup_artist(name).cloned())
    }

    async fn find_track(&self, title: &str, artists: &[String]) -> StoreResult<Option<Track>> {
        let state = self.state.read().await;
        let canonical: Vec<String> = artists
            .iter()
            .map(|a| state.lookup_artist(a).cloned().unwrap_or_else(|| a.clone()))
            .collect();
        let key = TrackKey::new(title.trim(), &canonical);
        Ok(state.tracks.get(&key).cloned())
    }

    async fn credit_rules(&self) -> StoreResult<HashMap<String, String>> {
        let state = self.state.read().await;
        Ok(state
            .credits
            .iter()
            .map(|(from, to)| {
                let from = state.artists.get(from).cloned().unwrap_or_else(|| from.clone());
                (from, to.clone())
            })
            .collect())
    }

    async fn credited_artist(&self, artist: &str) -> StoreResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state.credits.get(&normalize_name(artist.trim())).cloned())
    }

    async fn associated_artists(&self, artist: &str) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let wanted = normalize_name(artist.trim());
        let mut associated: Vec<String> = state
            .credits
            .iter()
            .filter(|(_, to)| normalize_name(to) == wanted)
            .map(|(from, _)| state.artists.get(from).cloned().unwrap_or_else(|| from.clone()))
            .collect();
        associated.sort();
        Ok(associated)
    }

    async fn is_confirmed_real(&self, artist: &str) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state.confirmed_real.contains(&normalize_name(artist.trim())))
    }

    async fn confirmed_real(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        Ok(state
            .confirmed_real
            .iter()
            .map(|name| state.artists.get(name).cloned().unwrap_or_else(|| name.clone()))
            .collect())
    }

    async fn first_seen(&self) -> StoreResult<FirstSeen> {
        let state = self.state.read().await;
        Ok(state.first_seen.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::Album;
    use tempfile::tempdir;

    fn track(title: &str, artists: &[&str]) -> Track {
        Track::new(title, artists.iter().copied())
    }

    #[tokio::test]
    async fn test_insert_keeps_time_order() {
        let store = MemoryStore::new();

        for t in [300, 100, 200] {
            store
                .insert(Scrobble::at(t, track("Song", &["Artist"])))
                .await
                .unwrap();
        }

        let all = store.scrobbles_between(0, 1000).await.unwrap();
        let times: Vec<i64> = all.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(store.first_scrobble_time().await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_window_is_half_open() {
        let store = MemoryStore::new();
        for t in [100, 200, 300] {
            store
                .insert(Scrobble::at(t, track("Song", &["Artist"])))
                .await
                .unwrap();
        }

        assert_eq!(store.scrobbles_between(100, 300).await.unwrap().len(), 2);
        assert_eq!(store.scrobbles_between(101, 301).await.unwrap().len(), 2);
        assert!(store.scrobbles_between(300, 300).await.unwrap().is_empty());
        assert!(store.scrobbles_between(400, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_names_resolve_to_first_spelling() {
        let store = MemoryStore::new();
        store
            .insert(Scrobble::at(1, track("Song", &["Beyoncé"])))
            .await
            .unwrap();
        let stored = store
            .insert(Scrobble::at(2, track("song", &["BEYONCE "])))
            .await
            .unwrap();

        assert_eq!(stored.track.artists, vec!["Beyoncé"]);
        assert_eq!(stored.track.title, "Song");
        assert_eq!(store.artists().await.unwrap(), vec!["Beyoncé"]);
        assert_eq!(store.tracks().await.unwrap().len(), 1);
        assert_eq!(
            store.find_artist("beyonce").await.unwrap(),
            Some("Beyoncé".to_string())
        );
        assert!(store
            .find_track("SONG", &["beyonce".to_string()])
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_rejects_invalid_scrobbles() {
        let store = MemoryStore::new();

        let result = store.insert(Scrobble::at(1, track("", &["Artist"]))).await;
        assert!(matches!(result, Err(StoreError::InvalidScrobble(_))));

        let result = store.insert(Scrobble::at(1, track("Song", &[" "]))).await;
        assert!(matches!(result, Err(StoreError::InvalidScrobble(_))));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_credit_rules() {
        let store = MemoryStore::new();
        store
            .insert(Scrobble::at(1, track("Song", &["Freddie Mercury"])))
            .await
            .unwrap();
        store.add_credit_rule("Freddie Mercury", "Queen").await;

        assert_eq!(
            store.credited_artist("freddie mercury").await.unwrap(),
            Some("Queen".to_string())
        );
        assert_eq!(
            store.associated_artists("Queen").await.unwrap(),
            vec!["Freddie Mercury"]
        );
        let rules = store.credit_rules().await.unwrap();
        assert_eq!(rules.get("Freddie Mercury"), Some(&"Queen".to_string()));
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scrobbles.json");

        {
            let store = MemoryStore::new();
            store
                .insert(
                    Scrobble::at(
                        100,
                        track("Song", &["Artist"]).album(Album::new("Record", ["Artist"])),
                    )
                    .origin("client:test"),
                )
                .await
                .unwrap();
            store.add_credit_rule("Side Project", "Artist").await;
            store.confirm_real("Artist").await;
            store.save(&path).await.unwrap();
        }

        let store = MemoryStore::load(&path).await.unwrap();
        let all = store.scrobbles_between(0, 1000).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].origin, "client:test");
        assert!(store.is_confirmed_real("artist").await.unwrap());
        assert_eq!(
            store.credited_artist("Side Project").await.unwrap(),
            Some("Artist".to_string())
        );
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::load(&dir.path().join("missing.json"))
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }
}
