//! Scrobble Service
//!
//! The query facade: composes the store, time-range resolver, chart
//! aggregator, cache, medal ledger and reconciler into the operations a
//! front end calls.
//!
//! - **dto**: Operation inputs and outputs
//! - **state**: Startup lifecycle
//! - **error**: Error types
//!
//! # Lifecycle
//!
//! ```text
//! NotReady ──start()──▶ Healthy ──ledger built──▶ Complete
//!   reads fail            reads served              medals and topweeks
//!   with NotReady                                   included in info
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryStore::load(&path).await?);
//! let service = ScrobbleService::new(store, ServiceConfig::default());
//! service.start().await?;
//!
//! service.submit_scrobble(ScrobbleSubmission::new(["Queen"], "Innuendo")).await?;
//! let chart = service.chart_artists(&RangeOptions::default().within("7d")).await?;
//! ```

pub mod dto;
pub mod error;
pub mod state;

pub use dto::{
    ArtistInfo, Certification, CertificationThresholds, EntityRef, PerformanceEntry, PulseEntry,
    ScrobbleSubmission, SearchKind, SearchResults, SubmitOutcome, SubmitStatus, TopEntry,
    TrackInfo,
};
pub use error::{ServiceError, ServiceResult, RETRY_AFTER_SECS};
pub use state::ServiceStatus;

use crate::cache::{CacheConfig, CacheKey, CacheLayer, CacheStats, CachedValue};
use crate::ledger::MedalLedger;
use crate::query::{
    ChartAggregator, ChartEntry, ChartFilter, RangeOptions, TimeRangeResolver, TimeWindow,
};
use crate::reconcile::{ArtistReconciler, IssueReport};
use crate::store::{normalize_name, Scrobble, ScrobbleStore, Track};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Service configuration
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub certification: CertificationThresholds,
}

/// Read-side facade over a [`ScrobbleStore`]
pub struct ScrobbleService {
    store: Arc<dyn ScrobbleStore>,
    config: ServiceConfig,
    resolver: TimeRangeResolver,
    cache: CacheLayer,
    ledger: MedalLedger,
    status: RwLock<ServiceStatus>,
    started: AtomicBool,
    /// Last reconciliation report
    issues: RwLock<IssueReport>,
}

impl ScrobbleService {
    pub fn new(store: Arc<dyn ScrobbleStore>, config: ServiceConfig) -> Self {
        Self {
            store,
            cache: CacheLayer::new(config.cache.clone()),
            config,
            resolver: TimeRangeResolver::new(),
            ledger: MedalLedger::new(),
            status: RwLock::new(ServiceStatus::NotReady),
            started: AtomicBool::new(false),
            issues: RwLock::new(IssueReport::default()),
        }
    }

    /// Run the startup sequence
    ///
    /// Registers the first event time, opens the service for reads, then
    /// builds the medal ledger. Calling it again after a successful start is a
    /// no-op; after a failed one it retries.
    pub async fn start(&self) -> ServiceResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Service already started");
            return Ok(());
        }

        if let Err(err) = self.startup().await {
            self.started.store(false, Ordering::SeqCst);
            let status = self.status().await;
            warn!(error = %err, %status, "Service startup failed");
            return Err(err);
        }
        Ok(())
    }

    async fn startup(&self) -> ServiceResult<()> {
        let now = Utc::now().timestamp();
        let first = self.store.first_scrobble_time().await?;
        self.resolver.register_first_event(first.unwrap_or(now));
        self.set_status(ServiceStatus::Healthy).await;
        info!(first_scrobble = ?first, "Service healthy");

        self.ledger.update(self.store.as_ref()).await?;
        self.set_status(ServiceStatus::Complete).await;
        info!("Service complete");

        Ok(())
    }

    pub async fn status(&self) -> ServiceStatus {
        *self.status.read().await
    }

    async fn set_status(&self, status: ServiceStatus) {
        *self.status.write().await = status;
    }

    async fn ensure_ready(&self) -> ServiceResult<()> {
        if self.status().await.is_ready() {
            Ok(())
        } else {
            Err(ServiceError::not_ready())
        }
    }

    // ============================================
    // INGESTION
    // ============================================

    /// Record a scrobble
    ///
    /// Invalid submissions come back as a failed outcome and touch neither
    /// the store nor the cache.
    pub async fn submit_scrobble(&self, submission: ScrobbleSubmission) -> ServiceResult<SubmitOutcome> {
        let scrobble = match submission.into_scrobble(Utc::now().timestamp()) {
            Ok(scrobble) => scrobble,
            Err(reason) => {
                warn!(%reason, "Rejected scrobble");
                return Ok(SubmitOutcome::failure(reason));
            }
        };

        let stored = self.record(scrobble).await?;
        info!(
            track = %stored.track,
            time = stored.time,
            origin = %stored.origin,
            "Scrobble recorded"
        );
        Ok(SubmitOutcome::success(stored))
    }

    /// Record already validated scrobbles, such as a CSV import
    ///
    /// Returns how many were stored. Stops at the first store error.
    pub async fn import_scrobbles(&self, scrobbles: Vec<Scrobble>) -> ServiceResult<usize> {
        let mut imported = 0;
        for scrobble in scrobbles {
            self.record(scrobble).await?;
            imported += 1;
        }
        info!(imported, "Imported scrobbles");
        Ok(imported)
    }

    async fn record(&self, scrobble: Scrobble) -> ServiceResult<Scrobble> {
        let stored = self.store.insert(scrobble).await?;
        self.resolver.note_event(stored.time);
        let invalidated = self.cache.invalidate(stored.time).await;
        debug!(time = stored.time, invalidated, "Invalidated cached windows");
        Ok(stored)
    }

    // ============================================
    // WINDOW QUERIES
    // ============================================

    /// Scrobbles in a window, newest first
    pub async fn list_scrobbles(
        &self,
        options: &RangeOptions,
        filter: Option<&EntityRef>,
    ) -> ServiceResult<Vec<Scrobble>> {
        self.ensure_ready().await?;
        let window = self.resolver.window(options)?;
        let filter = self.resolve_filter(filter).await?;
        let list = self.scrobble_list(&window, filter).await?;
        Ok(list.as_ref().clone())
    }

    /// Number of scrobbles in a window
    pub async fn count_scrobbles(
        &self,
        options: &RangeOptions,
        filter: Option<&EntityRef>,
    ) -> ServiceResult<u64> {
        self.ensure_ready().await?;
        let window = self.resolver.window(options)?;
        let filter = self.resolve_filter(filter).await?;
        self.scrobble_count(&window, filter).await
    }

    /// Artist chart for a window
    pub async fn chart_artists(&self, options: &RangeOptions) -> ServiceResult<Vec<ChartEntry<String>>> {
        self.ensure_ready().await?;
        let window = self.resolver.window(options)?;
        Ok(self.artist_chart(&window).await?.as_ref().clone())
    }

    /// Track chart for a window, optionally restricted to one artist's tracks
    pub async fn chart_tracks(
        &self,
        options: &RangeOptions,
        artist: Option<&str>,
    ) -> ServiceResult<Vec<ChartEntry<Track>>> {
        self.ensure_ready().await?;
        let window = self.resolver.window(options)?;
        let artist = artist.map(EntityRef::artist);
        let filter = self.resolve_filter(artist.as_ref()).await?;
        Ok(self.track_chart(&window, filter).await?.as_ref().clone())
    }

    // ============================================
    // SERIES QUERIES
    // ============================================

    /// Scrobble count per window
    pub async fn pulse(
        &self,
        options: &RangeOptions,
        filter: Option<&EntityRef>,
    ) -> ServiceResult<Vec<PulseEntry>> {
        self.ensure_ready().await?;
        let windows = self.resolver.windows(options)?;
        let filter = self.resolve_filter(filter).await?;

        let mut pulse = Vec::with_capacity(windows.len());
        for range in windows {
            let scrobbles = self.scrobble_count(&range, filter.clone()).await?;
            pulse.push(PulseEntry { range, scrobbles });
        }
        Ok(pulse)
    }

    /// Chart rank of an entity per window
    pub async fn performance(
        &self,
        options: &RangeOptions,
        entity: &EntityRef,
    ) -> ServiceResult<Vec<PerformanceEntry>> {
        self.ensure_ready().await?;
        let windows = self.resolver.windows(options)?;

        let mut performance = Vec::with_capacity(windows.len());
        match self.resolve_filter(Some(entity)).await? {
            Some(ChartFilter::Artist(artist)) => {
                for range in windows {
                    let chart = self.artist_chart(&range).await?;
                    let rank = chart
                        .iter()
                        .find(|e| normalize_name(&e.entity) == artist)
                        .map(|e| e.rank);
                    performance.push(PerformanceEntry { range, rank });
                }
            }
            Some(ChartFilter::Track(key)) => {
                for range in windows {
                    let chart = self.track_chart(&range, None).await?;
                    let rank = chart.iter().find(|e| e.entity.key() == key).map(|e| e.rank);
                    performance.push(PerformanceEntry { range, rank });
                }
            }
            None => {}
        }
        Ok(performance)
    }

    /// Number-one artist per window
    pub async fn top_artists(&self, options: &RangeOptions) -> ServiceResult<Vec<TopEntry<String>>> {
        self.ensure_ready().await?;
        let windows = self.resolver.windows(options)?;

        let mut top = Vec::with_capacity(windows.len());
        for range in windows {
            let chart = self.artist_chart(&range).await?;
            top.push(top_entry(range, &chart));
        }
        Ok(top)
    }

    /// Number-one track per window
    pub async fn top_tracks(&self, options: &RangeOptions) -> ServiceResult<Vec<TopEntry<Track>>> {
        self.ensure_ready().await?;
        let windows = self.resolver.windows(options)?;

        let mut top = Vec::with_capacity(windows.len());
        for range in windows {
            let chart = self.track_chart(&range, None).await?;
            top.push(top_entry(range, &chart));
        }
        Ok(top)
    }

    // ============================================
    // ENTITY QUERIES
    // ============================================

    /// All-time overview of one artist
    pub async fn artist_info(&self, name: &str) -> ServiceResult<ArtistInfo> {
        self.ensure_ready().await?;
        let artist = self
            .store
            .find_artist(name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("artist '{}'", name)))?;

        let alltime = self.resolver.alltime();
        let chart = self.artist_chart(&alltime).await?;
        let scrobbles = self
            .scrobble_count(&alltime, Some(ChartFilter::artist(&artist)))
            .await?;
        let associated = self.store.associated_artists(&artist).await?;
        let complete = self.status().await.is_complete();

        let key = normalize_name(&artist);
        if let Some(entry) = chart.iter().find(|e| normalize_name(&e.entity) == key) {
            let (medals, topweeks) = if complete {
                (
                    Some(self.ledger.artist_medals(&artist).await),
                    Some(self.ledger.artist_topweeks(&artist).await),
                )
            } else {
                (None, None)
            };

            return Ok(ArtistInfo {
                position: Some(entry.rank),
                certification: self.config.certification.tier(entry.count),
                artist,
                scrobbles,
                replace: None,
                associated,
                medals,
                topweeks,
            });
        }

        // Unranked: plays are credited to another artist, or there are none
        let replace = self.store.credited_artist(&artist).await?;
        let position = replace.as_deref().and_then(|target| {
            let target = normalize_name(target);
            chart
                .iter()
                .find(|e| normalize_name(&e.entity) == target)
                .map(|e| e.rank)
        });
        debug!(%artist, replace = ?replace, "Artist not ranked on its own");

        Ok(ArtistInfo {
            artist,
            scrobbles,
            position,
            replace,
            associated,
            certification: None,
            medals: None,
            topweeks: None,
        })
    }

    /// All-time overview of one track
    pub async fn track_info(&self, title: &str, artists: &[String]) -> ServiceResult<TrackInfo> {
        self.ensure_ready().await?;
        let track = self
            .store
            .find_track(title, artists)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("track '{}' by {}", title, artists.join(", ")))
            })?;

        let alltime = self.resolver.alltime();
        let chart = self.track_chart(&alltime, None).await?;
        let key = track.key();
        let entry = chart.iter().find(|e| e.entity.key() == key);

        let scrobbles = entry.map(|e| e.count).unwrap_or(0);
        let (medals, topweeks) = if self.status().await.is_complete() {
            (
                Some(self.ledger.track_medals(&key).await),
                Some(self.ledger.track_topweeks(&key).await),
            )
        } else {
            (None, None)
        };

        Ok(TrackInfo {
            position: entry.map(|e| e.rank),
            certification: self.config.certification.tier(scrobbles),
            track,
            scrobbles,
            medals,
            topweeks,
        })
    }

    /// Entities whose normalized name contains the normalized query
    pub async fn search(&self, query: &str, kind: SearchKind) -> ServiceResult<SearchResults> {
        self.ensure_ready().await?;
        let needle = normalize_name(query.trim());

        let results = match kind {
            SearchKind::Artist => SearchResults::Artists(
                self.store
                    .artists()
                    .await?
                    .into_iter()
                    .filter(|artist| normalize_name(artist).contains(&needle))
                    .collect(),
            ),
            SearchKind::Track => SearchResults::Tracks(
                self.store
                    .tracks()
                    .await?
                    .into_iter()
                    .filter(|track| normalize_name(&track.title).contains(&needle))
                    .collect(),
            ),
        };

        debug!(query, ?kind, hits = results.len(), "Search");
        Ok(results)
    }

    // ============================================
    // MAINTENANCE
    // ============================================

    /// Last reconciliation report (empty until the first check)
    pub async fn issues(&self) -> ServiceResult<IssueReport> {
        self.ensure_ready().await?;
        Ok(self.issues.read().await.clone())
    }

    /// Re-run artist reconciliation and keep the report
    pub async fn check_issues(&self) -> ServiceResult<IssueReport> {
        self.ensure_ready().await?;
        let artists = self.store.artists().await?;
        let confirmed_real = self.store.confirmed_real().await?;

        let report = ArtistReconciler::new(confirmed_real).analyze(&artists);
        info!(
            duplicates = report.duplicates.len(),
            combined = report.combined.len(),
            new_artists = report.new_artists.len(),
            "Artist issues checked"
        );

        *self.issues.write().await = report.clone();
        Ok(report)
    }

    /// Rebuild the medal ledger from the store
    pub async fn refresh_ledger(&self) -> ServiceResult<()> {
        self.ensure_ready().await?;
        self.ledger.update(self.store.as_ref()).await?;
        Ok(())
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    // ============================================
    // CACHED AGGREGATES
    // ============================================

    async fn resolve_filter(&self, entity: Option<&EntityRef>) -> ServiceResult<Option<ChartFilter>> {
        match entity {
            None => Ok(None),
            Some(EntityRef::Artist { name }) => {
                let artist = self
                    .store
                    .find_artist(name)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("artist '{}'", name)))?;
                Ok(Some(ChartFilter::artist(&artist)))
            }
            Some(EntityRef::Track { title, artists }) => {
                let track = self.store.find_track(title, artists).await?.ok_or_else(|| {
                    ServiceError::NotFound(format!("track '{}' by {}", title, artists.join(", ")))
                })?;
                Ok(Some(ChartFilter::track(&track)))
            }
        }
    }

    async fn artist_chart(&self, window: &TimeWindow) -> ServiceResult<Arc<Vec<ChartEntry<String>>>> {
        let window = *window;
        self.cache
            .get_or_compute(CacheKey::artist_chart(&window), || async move {
                let aggregator = ChartAggregator::load(self.store.as_ref()).await?;
                let scrobbles = self.store.scrobbles_between(window.since, window.to).await?;
                let chart = aggregator.artist_chart(&scrobbles, None);
                Ok::<_, ServiceError>(CachedValue::Artists(Arc::new(chart)))
            })
            .await?
            .into_artists()
            .ok_or_else(|| shape_mismatch("artist chart"))
    }

    async fn track_chart(
        &self,
        window: &TimeWindow,
        filter: Option<ChartFilter>,
    ) -> ServiceResult<Arc<Vec<ChartEntry<Track>>>> {
        let window = *window;
        let key = CacheKey::track_chart(&window, filter.clone());
        self.cache
            .get_or_compute(key, || async move {
                let aggregator = ChartAggregator::load(self.store.as_ref()).await?;
                let scrobbles = self.store.scrobbles_between(window.since, window.to).await?;
                let chart = aggregator.track_chart(&scrobbles, filter.as_ref());
                Ok::<_, ServiceError>(CachedValue::Tracks(Arc::new(chart)))
            })
            .await?
            .into_tracks()
            .ok_or_else(|| shape_mismatch("track chart"))
    }

    async fn scrobble_list(
        &self,
        window: &TimeWindow,
        filter: Option<ChartFilter>,
    ) -> ServiceResult<Arc<Vec<Scrobble>>> {
        let window = *window;
        let key = CacheKey::scrobble_list(&window, filter.clone());
        self.cache
            .get_or_compute(key, || async move {
                let mut scrobbles = self.store.scrobbles_between(window.since, window.to).await?;
                if let Some(filter) = &filter {
                    scrobbles.retain(|s| filter.matches(s));
                }
                scrobbles.reverse();
                Ok::<_, ServiceError>(CachedValue::Scrobbles(Arc::new(scrobbles)))
            })
            .await?
            .into_scrobbles()
            .ok_or_else(|| shape_mismatch("scrobble list"))
    }

    async fn scrobble_count(&self, window: &TimeWindow, filter: Option<ChartFilter>) -> ServiceResult<u64> {
        let window = *window;
        let key = CacheKey::scrobble_count(&window, filter.clone());
        self.cache
            .get_or_compute(key, || async move {
                let scrobbles = self.store.scrobbles_between(window.since, window.to).await?;
                let count = match &filter {
                    Some(filter) => scrobbles.iter().filter(|s| filter.matches(s)).count(),
                    None => scrobbles.len(),
                };
                Ok::<_, ServiceError>(CachedValue::Count(count as u64))
            })
            .await?
            .into_count()
            .ok_or_else(|| shape_mismatch("scrobble count"))
    }
}

fn shape_mismatch(expected: &str) -> ServiceError {
    ServiceError::Internal(format!("cached value is not a {}", expected))
}

fn top_entry<E: Clone>(range: TimeWindow, chart: &[ChartEntry<E>]) -> TopEntry<E> {
    match chart.first() {
        Some(entry) => TopEntry {
            range,
            entity: Some(entry.entity.clone()),
            scrobbles: entry.count,
        },
        None => TopEntry {
            range,
            entity: None,
            scrobbles: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::StepUnit;
    use crate::store::{FirstSeen, MemoryStore, StoreError, StoreResult};
    use std::collections::HashMap;

    async fn started(store: Arc<MemoryStore>) -> ScrobbleService {
        let service = ScrobbleService::new(store, ServiceConfig::default());
        service.start().await.unwrap();
        service
    }

    async fn submit(service: &ScrobbleService, artists: &[&str], title: &str, time: i64) {
        let outcome = service
            .submit_scrobble(ScrobbleSubmission::new(artists.iter().copied(), title).time(time))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    fn between(since: &str, to: &str) -> RangeOptions {
        RangeOptions::default().since(since).to(to)
    }

    #[tokio::test]
    async fn test_reads_rejected_until_started() {
        let service = ScrobbleService::new(Arc::new(MemoryStore::new()), ServiceConfig::default());
        assert_eq!(service.status().await, ServiceStatus::NotReady);

        let err = service.chart_artists(&RangeOptions::alltime()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotReady { retry_after_secs: 120 }));
        assert!(service.issues().await.unwrap_err().is_retryable());

        service.start().await.unwrap();
        assert_eq!(service.status().await, ServiceStatus::Complete);
        assert!(service.chart_artists(&RangeOptions::alltime()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_artist_chart_counts_window() {
        let service = started(Arc::new(MemoryStore::new())).await;
        for time in [100, 200, 300] {
            submit(&service, &["Queen"], "Innuendo", time).await;
        }

        let chart = service.chart_artists(&between("0", "10000")).await.unwrap();
        assert_eq!(
            chart,
            vec![ChartEntry {
                rank: 1,
                entity: "Queen".to_string(),
                count: 3
            }]
        );
    }

    #[tokio::test]
    async fn test_ingestion_invalidates_cached_chart() {
        let service = started(Arc::new(MemoryStore::new())).await;
        let now = Utc::now().timestamp();
        submit(&service, &["Queen"], "Innuendo", now - 3600).await;

        let before = service.chart_artists(&RangeOptions::alltime()).await.unwrap();
        assert_eq!(before[0].count, 1);
        assert_eq!(service.cache_stats().await.entries, 1);

        submit(&service, &["Queen"], "Innuendo", now - 1).await;
        assert_eq!(service.cache_stats().await.entries, 0);

        let after = service.chart_artists(&RangeOptions::alltime()).await.unwrap();
        assert_eq!(after[0].count, 2);
    }

    #[tokio::test]
    async fn test_backfill_invalidates_historical_window() {
        let service = started(Arc::new(MemoryStore::new())).await;
        submit(&service, &["Queen"], "Innuendo", 1_000_000).await;

        let window = between("999000", "1100000");
        assert_eq!(service.count_scrobbles(&window, None).await.unwrap(), 1);

        submit(&service, &["Queen"], "Innuendo", 1_000_500).await;
        assert_eq!(service.count_scrobbles(&window, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_import_lowers_first_event_and_invalidates() {
        let service = started(Arc::new(MemoryStore::new())).await;
        submit(&service, &["Queen"], "Innuendo", 5_000_000).await;
        assert_eq!(service.count_scrobbles(&RangeOptions::alltime(), None).await.unwrap(), 1);

        let imported = vec![
            Scrobble::at(1_000, Track::new("Heroes", ["David Bowie"])).origin("import:csv"),
            Scrobble::at(2_000, Track::new("Innuendo", ["Queen"])).origin("import:csv"),
        ];
        assert_eq!(service.import_scrobbles(imported).await.unwrap(), 2);

        assert_eq!(service.count_scrobbles(&RangeOptions::alltime(), None).await.unwrap(), 3);
        let list = service.list_scrobbles(&RangeOptions::alltime(), None).await.unwrap();
        assert_eq!(list.last().map(|s| s.time), Some(1_000));
    }

    #[tokio::test]
    async fn test_invalid_submission_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let service = started(store.clone()).await;
        submit(&service, &["Queen"], "Innuendo", 100).await;
        service.chart_artists(&RangeOptions::alltime()).await.unwrap();
        let stats = service.cache_stats().await;

        let outcome = service
            .submit_scrobble(ScrobbleSubmission::new(Vec::<String>::new(), "Song").time(150))
            .await
            .unwrap();

        assert_eq!(outcome.status, SubmitStatus::Failure);
        assert!(outcome.scrobble.is_none());
        assert_eq!(store.len().await, 1);
        assert_eq!(service.cache_stats().await, stats);
    }

    #[tokio::test]
    async fn test_list_scrobbles_newest_first_with_filter() {
        let service = started(Arc::new(MemoryStore::new())).await;
        submit(&service, &["Queen"], "Innuendo", 100).await;
        submit(&service, &["David Bowie"], "Heroes", 200).await;
        submit(&service, &["Queen", "David Bowie"], "Under Pressure", 300).await;

        let all = service
            .list_scrobbles(&RangeOptions::alltime(), None)
            .await
            .unwrap();
        let times: Vec<i64> = all.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![300, 200, 100]);

        let bowie = service
            .list_scrobbles(&RangeOptions::alltime(), Some(&EntityRef::artist("david bowie")))
            .await
            .unwrap();
        assert_eq!(bowie.len(), 2);

        let missing = service
            .list_scrobbles(&RangeOptions::alltime(), Some(&EntityRef::artist("Nobody")))
            .await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_range_rejected() {
        let service = started(Arc::new(MemoryStore::new())).await;
        let options = RangeOptions::default().since("2020").within("7d");

        let err = service.chart_artists(&options).await.unwrap_err();
        assert!(err.is_invalid_range());
    }

    #[tokio::test]
    async fn test_series_operations() {
        let service = started(Arc::new(MemoryStore::new())).await;
        // 2020-01-15, 2020-02-15, 2020-02-16
        submit(&service, &["Queen"], "Innuendo", 1_579_046_400).await;
        submit(&service, &["David Bowie"], "Heroes", 1_581_724_800).await;
        submit(&service, &["David Bowie"], "Heroes", 1_581_811_200).await;

        let options = RangeOptions::default().step("month").stepn(2).to("2020/02");

        let pulse = service.pulse(&options, None).await.unwrap();
        let counts: Vec<u64> = pulse.iter().map(|p| p.scrobbles).collect();
        assert_eq!(counts, vec![2, 1]);

        let top = service.top_artists(&options).await.unwrap();
        assert_eq!(top[0].entity.as_deref(), Some("David Bowie"));
        assert_eq!(top[1].entity.as_deref(), Some("Queen"));

        let performance = service
            .performance(&options, &EntityRef::artist("Queen"))
            .await
            .unwrap();
        let ranks: Vec<Option<u32>> = performance.iter().map(|p| p.rank).collect();
        assert_eq!(ranks, vec![None, Some(1)]);

        let tracks = service.top_tracks(&options).await.unwrap();
        assert_eq!(tracks[0].entity.as_ref().map(|t| t.title.as_str()), Some("Heroes"));
    }

    #[tokio::test]
    async fn test_artist_info_with_count_as() {
        let store = Arc::new(MemoryStore::new());
        store.add_credit_rule("Freddie Mercury", "Queen").await;
        let service = started(store).await;

        submit(&service, &["Queen"], "Innuendo", 1_579_046_400).await;
        submit(&service, &["Freddie Mercury"], "Living on My Own", 1_579_046_500).await;
        service.refresh_ledger().await.unwrap();

        let queen = service.artist_info("queen").await.unwrap();
        assert_eq!(queen.artist, "Queen");
        assert_eq!(queen.position, Some(1));
        assert_eq!(queen.scrobbles, 1);
        assert_eq!(queen.associated, vec!["Freddie Mercury"]);
        assert_eq!(queen.medals.map(|m| m.gold), Some(vec![2020]));

        let freddie = service.artist_info("Freddie Mercury").await.unwrap();
        assert_eq!(freddie.replace.as_deref(), Some("Queen"));
        assert_eq!(freddie.position, Some(1));
        assert!(freddie.medals.is_none());

        assert!(matches!(
            service.artist_info("Nobody").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_track_info_certification() {
        let store = Arc::new(MemoryStore::new());
        let config = ServiceConfig {
            certification: CertificationThresholds {
                gold: 2,
                platinum: 3,
                diamond: 10,
            },
            ..ServiceConfig::default()
        };
        let service = ScrobbleService::new(store, config);
        service.start().await.unwrap();

        for time in [100, 200, 300] {
            submit(&service, &["Queen"], "Innuendo", time).await;
        }

        let info = service
            .track_info("innuendo", &["QUEEN".to_string()])
            .await
            .unwrap();
        assert_eq!(info.scrobbles, 3);
        assert_eq!(info.position, Some(1));
        assert_eq!(info.certification, Some(Certification::Platinum));
    }

    #[tokio::test]
    async fn test_search_is_normalized() {
        let service = started(Arc::new(MemoryStore::new())).await;
        submit(&service, &["Beyoncé"], "Halo", 100).await;
        submit(&service, &["Queen"], "Innuendo", 200).await;

        let artists = service.search("BEYONCE", SearchKind::Artist).await.unwrap();
        assert_eq!(artists, SearchResults::Artists(vec!["Beyoncé".to_string()]));

        let tracks = service.search("endo", SearchKind::Track).await.unwrap();
        assert_eq!(tracks.len(), 1);
    }

    #[tokio::test]
    async fn test_issues_cached_until_checked() {
        let service = started(Arc::new(MemoryStore::new())).await;
        submit(&service, &["Bon Jovi"], "Always", 100).await;
        submit(&service, &["Jon Bon Jovi"], "Blaze of Glory", 200).await;

        assert!(service.issues().await.unwrap().is_empty());

        let report = service.check_issues().await.unwrap();
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(service.issues().await.unwrap(), report);
    }

    #[tokio::test]
    async fn test_start_registers_first_event() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(Scrobble::at(500, Track::new("Innuendo", ["Queen"])))
            .await
            .unwrap();
        let service = started(store).await;

        let scrobbles = service
            .list_scrobbles(&RangeOptions::alltime(), None)
            .await
            .unwrap();
        assert_eq!(scrobbles.len(), 1);

        // Backfilled before the registered first event
        submit(&service, &["Queen"], "Innuendo", 10).await;
        let scrobbles = service
            .list_scrobbles(&RangeOptions::alltime(), None)
            .await
            .unwrap();
        assert_eq!(scrobbles.len(), 2);
    }

    #[tokio::test]
    async fn test_open_window_recomputed_after_now_passes_a_scrobble() {
        let service = started(Arc::new(MemoryStore::new())).await;
        let now = Utc::now().timestamp();
        submit(&service, &["Queen"], "Innuendo", now - 100).await;
        submit(&service, &["Queen"], "Innuendo", now + 2).await;

        let alltime = RangeOptions::alltime();
        assert_eq!(service.count_scrobbles(&alltime, None).await.unwrap(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(3_100)).await;

        assert_eq!(service.count_scrobbles(&alltime, None).await.unwrap(), 2);
        assert_eq!(service.chart_artists(&alltime).await.unwrap()[0].count, 2);
    }

    #[tokio::test]
    async fn test_running_month_series_does_not_leak_into_since_month() {
        let service = started(Arc::new(MemoryStore::new())).await;
        let now = Utc::now().timestamp();
        let month_start = StepUnit::Month.truncate(now);
        let month_end = StepUnit::Month.advance(month_start, 1);
        submit(&service, &["Queen"], "Innuendo", month_start).await;
        submit(&service, &["Queen"], "Innuendo", month_end - 1).await;

        let series = RangeOptions::default().step("month").stepn(1);
        let pulse = service.pulse(&series, None).await.unwrap();
        assert_eq!(pulse.len(), 1);
        assert_eq!(pulse[0].range, TimeWindow::new(month_start, month_end));
        assert_eq!(pulse[0].scrobbles, 2);

        let month = chrono::DateTime::<Utc>::from_timestamp(month_start, 0)
            .unwrap()
            .format("%Y/%m")
            .to_string();
        let since_month = RangeOptions::default().since(month);
        assert_eq!(service.count_scrobbles(&since_month, None).await.unwrap(), 1);
        assert_eq!(service.list_scrobbles(&since_month, None).await.unwrap().len(), 1);
    }

    /// Store whose window reads fail until `fail` is cleared
    struct FlakyStore {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ScrobbleStore for FlakyStore {
        async fn insert(&self, scrobble: Scrobble) -> StoreResult<Scrobble> {
            self.inner.insert(scrobble).await
        }

        async fn scrobbles_between(&self, since: i64, to: i64) -> StoreResult<Vec<Scrobble>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Corruption("window read failed".to_string()));
            }
            self.inner.scrobbles_between(since, to).await
        }

        async fn first_scrobble_time(&self) -> StoreResult<Option<i64>> {
            self.inner.first_scrobble_time().await
        }

        async fn artists(&self) -> StoreResult<Vec<String>> {
            self.inner.artists().await
        }

        async fn tracks(&self) -> StoreResult<Vec<Track>> {
            self.inner.tracks().await
        }

        async fn find_artist(&self, name: &str) -> StoreResult<Option<String>> {
            self.inner.find_artist(name).await
        }

        async fn find_track(&self, title: &str, artists: &[String]) -> StoreResult<Option<Track>> {
            self.inner.find_track(title, artists).await
        }

        async fn credit_rules(&self) -> StoreResult<HashMap<String, String>> {
            self.inner.credit_rules().await
        }

        async fn credited_artist(&self, artist: &str) -> StoreResult<Option<String>> {
            self.inner.credited_artist(artist).await
        }

        async fn associated_artists(&self, artist: &str) -> StoreResult<Vec<String>> {
            self.inner.associated_artists(artist).await
        }

        async fn is_confirmed_real(&self, artist: &str) -> StoreResult<bool> {
            self.inner.is_confirmed_real(artist).await
        }

        async fn confirmed_real(&self) -> StoreResult<Vec<String>> {
            self.inner.confirmed_real().await
        }

        async fn first_seen(&self) -> StoreResult<FirstSeen> {
            self.inner.first_seen().await
        }
    }

    #[tokio::test]
    async fn test_failed_startup_can_be_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail: AtomicBool::new(true),
        });
        let service = ScrobbleService::new(store.clone(), ServiceConfig::default());

        assert!(service.start().await.is_err());
        assert_ne!(service.status().await, ServiceStatus::Complete);

        store.fail.store(false, Ordering::SeqCst);
        service.start().await.unwrap();
        assert_eq!(service.status().await, ServiceStatus::Complete);
    }
}
