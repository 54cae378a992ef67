//! Periodic harvest job
//!
//! Each run fetches candidates newer than the watermark, keeps probable
//! solutions that were never processed before, and appends them to the
//! target connector. The processed set is persisted once per batch and only
//! then does the watermark advance.

use crate::errors::Result;
use crate::extract::{extract_fact, is_probable_solution};
use crate::source::FactSource;
use crate::state::{ProcessedSet, StateFile};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use switchyard_common::cancellation::CancellationToken;
use switchyard_common::errors::AppError;
use switchyard_common::metrics;
use switchyard_search::Connector;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Counters for a single run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub fetched: usize,
    /// Passed the solution filter
    pub accepted: usize,
    pub appended: usize,
    /// Already processed or filtered out
    pub skipped: usize,
    pub failed: usize,
}

pub struct HarvestJob {
    source: Arc<dyn FactSource>,
    target: Arc<dyn Connector>,
    state: StateFile,
    keywords: Vec<String>,
    watermark: std::sync::Mutex<Option<DateTime<Utc>>>,
    run_lock: Mutex<()>,
}

impl HarvestJob {
    pub fn new(
        source: Arc<dyn FactSource>,
        target: Arc<dyn Connector>,
        state: StateFile,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            source,
            target,
            state,
            keywords,
            watermark: std::sync::Mutex::new(None),
            run_lock: Mutex::new(()),
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark.lock().map(|w| *w).unwrap_or(None)
    }

    fn set_watermark(&self, value: DateTime<Utc>) {
        if let Ok(mut watermark) = self.watermark.lock() {
            if watermark.map_or(true, |current| value > current) {
                *watermark = Some(value);
            }
        }
    }

    /// Run one harvest pass.
    ///
    /// Returns `Ok(None)` without doing anything when another pass is still
    /// in progress.
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn run_once(&self) -> Result<Option<HarvestReport>> {
        let _running = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!(source = %self.source.name(), "Harvest already running, skipping");
                metrics::record_harvest("skipped", 0);
                return Ok(None);
            }
        };

        match self.harvest().await {
            Ok(report) => {
                metrics::record_harvest("ok", report.appended);
                Ok(Some(report))
            }
            Err(e) => {
                metrics::record_harvest("error", 0);
                Err(e)
            }
        }
    }

    async fn harvest(&self) -> Result<HarvestReport> {
        let since = self.watermark();
        let mut processed: ProcessedSet = self.state.load().await?;
        let candidates = self.source.fetch_since(since).await?;

        let mut report = HarvestReport {
            fetched: candidates.len(),
            ..Default::default()
        };
        let newest = candidates.iter().map(|c| c.timestamp).max();

        for candidate in &candidates {
            if processed.contains(&candidate.id) {
                report.skipped += 1;
                continue;
            }
            if !is_probable_solution(candidate, &self.keywords) {
                report.skipped += 1;
                continue;
            }
            report.accepted += 1;

            let fact = extract_fact(candidate);
            match self.target.add(fact).await {
                Ok(()) => {
                    report.appended += 1;
                    processed.insert(candidate.id.clone());
                }
                Err(AppError::DuplicateItem { id, .. }) => {
                    debug!(candidate = %candidate.id, item = %id, "Fact already present");
                    report.skipped += 1;
                    processed.insert(candidate.id.clone());
                }
                Err(e) => {
                    warn!(candidate = %candidate.id, error = %e, "Failed to append harvested fact");
                    report.failed += 1;
                }
            }
        }

        self.state.save(&processed).await?;

        // Failed candidates must stay reachable on the next pass.
        if report.failed == 0 {
            if let Some(newest) = newest {
                self.set_watermark(newest);
            }
        }

        info!(
            source = %self.source.name(),
            target = %self.target.tag(),
            fetched = report.fetched,
            accepted = report.accepted,
            appended = report.appended,
            skipped = report.skipped,
            failed = report.failed,
            "Harvest run completed"
        );
        Ok(report)
    }

    /// Run on a fixed period until `shutdown` is cancelled
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Harvest loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Harvest run failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fact_id;
    use crate::source::{HarvestCandidate, MemoryFactSource};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use switchyard_common::embeddings::HashedEmbedder;
    use switchyard_common::models::{KnowledgeItem, SourceKind};
    use switchyard_search::{KnowledgeConnector, MemoryStore};
    use tokio::sync::Notify;

    fn candidate(id: &str, subject: &str, body: &str, minute: u32) -> HarvestCandidate {
        HarvestCandidate {
            id: id.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
        }
    }

    fn keywords() -> Vec<String> {
        vec!["resolved".to_string(), "workaround".to_string()]
    }

    async fn target(items: Vec<KnowledgeItem>) -> (Arc<KnowledgeConnector>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_items(items));
        let connector = Arc::new(KnowledgeConnector::new(
            "harvested",
            SourceKind::Tickets,
            store.clone(),
            Arc::new(HashedEmbedder::new(32)),
        ));
        connector.initialize().await.unwrap();
        (connector, store)
    }

    #[tokio::test]
    async fn test_appends_solutions_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MemoryFactSource::new(vec![
            candidate("m-1", "VPN drops", "Resolved by updating the client", 1),
            candidate("m-2", "Printer?", "Is anyone else seeing this", 2),
            candidate("m-3", "Re: Outlook crash", "Workaround: safe mode", 3),
        ]));
        let (connector, _) = target(vec![]).await;
        let state = StateFile::new(dir.path().join("processed.json"));
        let job = HarvestJob::new(source.clone(), connector.clone(), state.clone(), keywords());

        let first = job.run_once().await.unwrap().unwrap();
        assert_eq!(first.fetched, 3);
        assert_eq!(first.accepted, 2);
        assert_eq!(first.appended, 2);
        assert_eq!(first.skipped, 1);

        let m3 = candidate("m-3", "Re: Outlook crash", "Workaround: safe mode", 3);
        let fact = connector.get_by_id(&fact_id(&m3)).await.unwrap().unwrap();
        assert_eq!(fact.title, "Outlook crash");
        assert_eq!(fact.updated_at, m3.timestamp);
        assert_eq!(state.load().await.unwrap().ids(), &["m-1".to_string(), "m-3".to_string()]);
        assert_eq!(job.watermark(), Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 3, 0).unwrap()));

        let second = job.run_once().await.unwrap().unwrap();
        assert_eq!(second.appended, 0);
        assert_eq!(connector.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_processed_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        let candidates = vec![candidate("m-1", "VPN", "resolved", 1)];
        let (connector, _) = target(vec![]).await;

        let job = HarvestJob::new(
            Arc::new(MemoryFactSource::new(candidates.clone())),
            connector.clone(),
            StateFile::new(&path),
            keywords(),
        );
        assert_eq!(job.run_once().await.unwrap().unwrap().appended, 1);

        // Fresh job: no watermark, but the state file remembers m-1.
        let restarted = HarvestJob::new(
            Arc::new(MemoryFactSource::new(candidates)),
            connector,
            StateFile::new(&path),
            keywords(),
        );
        let report = restarted.run_once().await.unwrap().unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.appended, 0);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_existing_fact_counts_as_processed() {
        let dir = tempfile::tempdir().unwrap();
        let m1 = candidate("m-1", "VPN", "resolved", 1);
        let existing = KnowledgeItem::new(fact_id(&m1), "VPN", "resolved");
        let (connector, _) = target(vec![existing]).await;
        let state = StateFile::new(dir.path().join("processed.json"));
        let job = HarvestJob::new(
            Arc::new(MemoryFactSource::new(vec![m1])),
            connector,
            state.clone(),
            keywords(),
        );

        let report = job.run_once().await.unwrap().unwrap();
        assert_eq!(report.appended, 0);
        assert_eq!(report.failed, 0);
        assert!(state.load().await.unwrap().contains("m-1"));
    }

    #[tokio::test]
    async fn test_ids_that_sanitize_alike_are_both_appended() {
        let dir = tempfile::tempdir().unwrap();
        let (connector, _) = target(vec![]).await;
        let job = HarvestJob::new(
            Arc::new(MemoryFactSource::new(vec![
                candidate("msg/42", "VPN", "Resolved by a reboot", 1),
                candidate("msg_42", "Printer", "Resolved by clearing the queue", 2),
            ])),
            connector.clone(),
            StateFile::new(dir.path().join("processed.json")),
            keywords(),
        );

        let report = job.run_once().await.unwrap().unwrap();
        assert_eq!(report.appended, 2);
        assert_eq!(report.skipped, 0);

        let titles: Vec<String> =
            connector.get_all().await.unwrap().into_iter().map(|item| item.title).collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"VPN".to_string()));
        assert!(titles.contains(&"Printer".to_string()));
    }

    #[tokio::test]
    async fn test_failed_append_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (connector, store) = target(vec![]).await;
        let state = StateFile::new(dir.path().join("processed.json"));
        let job = HarvestJob::new(
            Arc::new(MemoryFactSource::new(vec![candidate("m-1", "VPN", "resolved", 1)])),
            connector,
            state.clone(),
            keywords(),
        );

        store.set_fail_saves(true);
        let report = job.run_once().await.unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert!(!state.load().await.unwrap().contains("m-1"));
        assert_eq!(job.watermark(), None);

        store.set_fail_saves(false);
        let report = job.run_once().await.unwrap().unwrap();
        assert_eq!(report.appended, 1);
    }

    struct GatedSource {
        entered: AtomicBool,
        release: Notify,
    }

    #[async_trait]
    impl FactSource for GatedSource {
        fn name(&self) -> &str {
            "gated"
        }

        async fn fetch_since(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<HarvestCandidate>> {
            self.entered.store(true, Ordering::SeqCst);
            self.release.notified().await;
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(GatedSource {
            entered: AtomicBool::new(false),
            release: Notify::new(),
        });
        let (connector, _) = target(vec![]).await;
        let job = Arc::new(HarvestJob::new(
            source.clone(),
            connector,
            StateFile::new(dir.path().join("processed.json")),
            keywords(),
        ));

        let running = tokio::spawn({
            let job = job.clone();
            async move { job.run_once().await }
        });
        while !source.entered.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        assert!(job.run_once().await.unwrap().is_none());

        source.release.notify_one();
        assert!(running.await.unwrap().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MemoryFactSource::new(vec![]));
        let (connector, _) = target(vec![]).await;
        let job = HarvestJob::new(
            source.clone(),
            connector,
            StateFile::new(dir.path().join("processed.json")),
            keywords(),
        );

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        job.run(Duration::from_secs(3600), shutdown).await;
        assert!(source.fetch_count() <= 1);
    }
}
