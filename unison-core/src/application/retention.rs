//! Pin retention: keeps queued content and the most recently played rounds pinned, and releases the rest.

use crate::domain::coordination::ResolvedRound;
use crate::domain::{PinLedger, PinLedgerSnapshot};
use crate::foundation::util::result_ext::ResultExt;
use crate::foundation::{ContentId, RoundId, UnisonError};
use crate::infrastructure::storage::StateStore;
use crate::infrastructure::store::ContentStore;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub unpinned: usize,
    pub unpin_failures: usize,
    pub retried_pins: usize,
    pub dropped_rounds: Vec<RoundId>,
    pub gc_ran: bool,
}

pub struct PinRetentionManager {
    store: Arc<dyn ContentStore>,
    state: Arc<dyn StateStore>,
    ledger: Mutex<PinLedger>,
    /// Content ids this node believes are pinned, so resolved rounds do not re-pin.
    pinned: Mutex<HashSet<ContentId>>,
    gc_every: u32,
    cycles: AtomicU32,
}

impl PinRetentionManager {
    /// Restores the ledger from `pin_records.json`. Content listed there counts as pinned.
    pub fn new(
        store: Arc<dyn ContentStore>,
        state: Arc<dyn StateStore>,
        retained_rounds: usize,
        gc_every: u32,
    ) -> Result<Self, UnisonError> {
        let snapshot = state.load_pin_ledger().or_default()?;
        let ledger = PinLedger::restore(retained_rounds, snapshot);
        let mut pinned = ledger.live_content_ids();
        for pending in &ledger.snapshot().pending_pins {
            pinned.remove(pending);
        }
        info!("retention: restored records={} pinned={} retained_rounds={}", ledger.len(), pinned.len(), retained_rounds);
        Ok(Self { store, state, ledger: Mutex::new(ledger), pinned: Mutex::new(pinned), gc_every, cycles: AtomicU32::new(0) })
    }

    fn lock_ledger(&self) -> Result<MutexGuard<'_, PinLedger>, UnisonError> {
        self.ledger.lock().map_err(|_| UnisonError::Message("pin ledger lock poisoned".to_string()))
    }

    fn lock_pinned(&self) -> Result<MutexGuard<'_, HashSet<ContentId>>, UnisonError> {
        self.pinned.lock().map_err(|_| UnisonError::Message("pinned set lock poisoned".to_string()))
    }

    pub fn snapshot(&self) -> Result<PinLedgerSnapshot, UnisonError> {
        Ok(self.lock_ledger()?.snapshot())
    }

    pub fn is_pinned(&self, content_id: &ContentId) -> bool {
        self.lock_pinned().map(|pinned| pinned.contains(content_id)).unwrap_or(false)
    }

    fn persist(&self) -> Result<(), UnisonError> {
        let snapshot = self.lock_ledger()?.snapshot();
        self.state.save_pin_ledger(&snapshot)
    }

    fn with_ledger<T>(&self, f: impl FnOnce(&mut PinLedger) -> T) -> Result<T, UnisonError> {
        let value = {
            let mut ledger = self.lock_ledger()?;
            f(&mut ledger)
        };
        self.persist()?;
        Ok(value)
    }

    /// Fetches and pins a round winner's content before `deadline_ns`.
    ///
    /// The round is recorded first so a crash mid-pin still leaves a ledger entry to clean up.
    pub async fn realize(&self, round_id: RoundId, content_ids: &[ContentId], deadline_ns: u64, now_ns: u64) -> Result<(), UnisonError> {
        self.with_ledger(|ledger| ledger.record(round_id, content_ids.to_vec(), now_ns))?;
        let budget = Duration::from_nanos(deadline_ns.saturating_sub(now_ns));
        for content_id in content_ids {
            if self.is_pinned(content_id) {
                continue;
            }
            match tokio::time::timeout(budget, self.store.pin(content_id)).await {
                Ok(Ok(())) => self.mark_pinned(content_id)?,
                Ok(Err(err)) => {
                    self.with_ledger(|ledger| ledger.mark_pin_failed(content_id.clone()))?;
                    return Err(UnisonError::PinFailure { content_id: content_id.to_string(), details: err.to_string() });
                }
                Err(_) => {
                    self.with_ledger(|ledger| ledger.mark_pin_failed(content_id.clone()))?;
                    return Err(UnisonError::FetchTimeout { round_id, content_id: content_id.to_string() });
                }
            }
        }
        debug!("retention: realized round_id={} segments={}", round_id, content_ids.len());
        Ok(())
    }

    fn mark_pinned(&self, content_id: &ContentId) -> Result<(), UnisonError> {
        self.lock_pinned()?.insert(content_id.clone());
        self.with_ledger(|ledger| ledger.mark_pinned(content_id))
    }

    /// Records the content actually queued for a resolved round and pins whatever is not pinned yet.
    ///
    /// The round's record is replaced, so content of a demoted winner is queued for unpinning.
    /// Pin failures are kept as pending pins and retried by [`Self::cleanup`].
    pub async fn on_round_resolved(&self, round: &ResolvedRound, now_ns: u64) -> Result<(), UnisonError> {
        let content_ids: Vec<ContentId> = round.segments().iter().map(|s| s.content_id.clone()).collect();
        let released = self.with_ledger(|ledger| ledger.replace(round.round_id, content_ids.clone(), now_ns))?;
        if !released.is_empty() {
            info!("retention: round content replaced round_id={} released={} kept={}", round.round_id, released.len(), content_ids.len());
        }
        for content_id in &content_ids {
            if self.is_pinned(content_id) {
                continue;
            }
            if let Err(err) = self.store.pin(content_id).await {
                let err = UnisonError::PinFailure { content_id: content_id.to_string(), details: err.to_string() };
                warn!("retention: {} round_id={}", err, round.round_id);
                self.with_ledger(|ledger| ledger.mark_pin_failed(content_id.clone()))?;
                continue;
            }
            self.mark_pinned(content_id)?;
        }
        Ok(())
    }

    /// Releases content of played rounds past the retention limit. Nothing in `active_window`
    /// or in rounds from `playing_round` onward is touched.
    pub async fn cleanup(&self, active_window: &HashSet<ContentId>, playing_round: RoundId) -> Result<CleanupReport, UnisonError> {
        let plan = self.with_ledger(|ledger| ledger.plan_cleanup(active_window, playing_round))?;
        let mut report = CleanupReport { dropped_rounds: plan.dropped_rounds.clone(), ..Default::default() };

        for content_id in &plan.unpin {
            match self.store.unpin(content_id).await {
                Ok(()) => {
                    self.lock_pinned()?.remove(content_id);
                    self.with_ledger(|ledger| ledger.mark_unpinned(content_id))?;
                    report.unpinned += 1;
                }
                Err(err) => {
                    let err = UnisonError::UnpinFailure { content_id: content_id.to_string(), details: err.to_string() };
                    warn!("retention: {}", err);
                    self.with_ledger(|ledger| ledger.mark_unpin_failed(content_id.clone()))?;
                    report.unpin_failures += 1;
                }
            }
        }

        for content_id in &plan.retry_pins {
            match self.store.pin(content_id).await {
                Ok(()) => {
                    self.mark_pinned(content_id)?;
                    report.retried_pins += 1;
                }
                Err(err) => debug!("retention: pin retry failed content_id={} error={}", content_id, err),
            }
        }

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        if self.gc_every > 0 && cycle % self.gc_every == 0 {
            match self.store.gc().await {
                Ok(()) => report.gc_ran = true,
                Err(err) => warn!("retention: gc failed error={}", err),
            }
        }

        if !plan.is_empty() {
            info!(
                "retention: cleanup dropped_rounds={:?} unpinned={} unpin_failures={} retried_pins={}",
                report.dropped_rounds, report.unpinned, report.unpin_failures, report.retried_pins
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::SegmentRef;
    use crate::domain::coordination::{Proposal, ProposalBody};
    use crate::foundation::{PeerId, TrackId};
    use crate::infrastructure::storage::MemoryStateStore;
    use crate::infrastructure::store::{MemoryContentStore, StoreFaults};

    fn resolved(round_id: RoundId, segments: u32) -> ResolvedRound {
        let track_id = TrackId::new(format!("track-{round_id}"));
        let segs = (0..segments)
            .map(|i| SegmentRef {
                track_id: track_id.clone(),
                segment_index: i,
                content_id: ContentId::new(format!("r{round_id}s{i}")),
                duration_ms: 6_000,
            })
            .collect();
        let winner = Proposal::new(round_id, PeerId::from("p"), ProposalBody::Track { track_id }, segs, 0);
        ResolvedRound { round_id, winner: Some(winner), consensus_hash: None, is_fallback: false, candidate_count: 1, resolved_at_ns: 0 }
    }

    fn store_with(rounds: std::ops::RangeInclusive<RoundId>, segments: u32) -> Arc<MemoryContentStore> {
        let store = Arc::new(MemoryContentStore::new());
        for round_id in rounds {
            for i in 0..segments {
                store.insert(ContentId::new(format!("r{round_id}s{i}")), format!("bytes-{round_id}-{i}"));
            }
        }
        store
    }

    #[tokio::test]
    async fn keeps_most_recent_rounds_and_active_window() {
        let store = store_with(1..=6, 2);
        let state = Arc::new(MemoryStateStore::new());
        let manager = PinRetentionManager::new(store.clone(), state.clone(), 3, 0).expect("manager");
        for round_id in 1..=6 {
            manager.on_round_resolved(&resolved(round_id, 2), round_id).await.expect("resolved");
        }
        assert_eq!(store.pinned().len(), 12);

        let active: HashSet<ContentId> = [ContentId::from("r2s1")].into_iter().collect();
        let report = manager.cleanup(&active, RoundId::MAX).await.expect("cleanup");
        assert_eq!(report.unpinned, 5);
        assert!(store.is_pinned(&ContentId::from("r2s1")));
        assert!(!store.is_pinned(&ContentId::from("r1s0")));
        for round_id in 4..=6 {
            assert!(store.is_pinned(&ContentId::new(format!("r{round_id}s0"))));
        }

        let report = manager.cleanup(&HashSet::new(), RoundId::MAX).await.expect("second cleanup");
        assert_eq!(report.unpinned, 1);
        assert_eq!(store.pinned().len(), 6);
        assert_eq!(state.load_pin_ledger().expect("load").expect("saved").records.len(), 3);
    }

    #[tokio::test]
    async fn realize_pins_within_deadline_and_reports_failures() {
        let store = store_with(1..=1, 2);
        let state = Arc::new(MemoryStateStore::new());
        let manager = PinRetentionManager::new(store.clone(), state, 3, 0).expect("manager");
        let ids = vec![ContentId::from("r1s0"), ContentId::from("r1s1")];
        manager.realize(1, &ids, 1_000_000_000, 0).await.expect("realize");
        assert!(ids.iter().all(|id| store.is_pinned(id)));

        let missing = vec![ContentId::from("r9s0")];
        let err = manager.realize(9, &missing, 1_000_000_000, 0).await.expect_err("missing content");
        assert!(matches!(err, UnisonError::PinFailure { .. }));
        assert!(manager.snapshot().expect("snapshot").pending_pins.contains(&missing[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn realize_times_out_at_deadline() {
        let store = store_with(1..=1, 1);
        store.set_faults(StoreFaults { pin_delay: Some(Duration::from_secs(30)), ..Default::default() });
        let manager = PinRetentionManager::new(store, Arc::new(MemoryStateStore::new()), 3, 0).expect("manager");
        let err = manager.realize(1, &[ContentId::from("r1s0")], 5_000_000_000, 0).await.expect_err("timeout");
        assert!(matches!(err, UnisonError::FetchTimeout { round_id: 1, .. }));
    }

    #[tokio::test]
    async fn failed_unpins_and_pins_are_retried() {
        let store = store_with(1..=3, 1);
        store.set_faults(StoreFaults {
            fail_unpins: [ContentId::from("r1s0")].into_iter().collect(),
            fail_pins: [ContentId::from("r3s0")].into_iter().collect(),
            ..Default::default()
        });
        let manager = PinRetentionManager::new(store.clone(), Arc::new(MemoryStateStore::new()), 1, 2).expect("manager");
        manager.on_round_resolved(&resolved(1, 1), 1).await.expect("r1");
        manager.on_round_resolved(&resolved(2, 1), 2).await.expect("r2");
        manager.on_round_resolved(&resolved(3, 1), 3).await.expect("r3 logs pin failure");
        assert!(!store.is_pinned(&ContentId::from("r3s0")));

        let report = manager.cleanup(&HashSet::new(), RoundId::MAX).await.expect("cleanup");
        assert_eq!(report.unpin_failures, 1);
        assert_eq!(report.unpinned, 1);
        assert!(!report.gc_ran);

        store.set_faults(StoreFaults::default());
        let report = manager.cleanup(&HashSet::new(), RoundId::MAX).await.expect("retry");
        assert_eq!(report.unpinned, 1);
        assert_eq!(report.retried_pins, 1);
        assert!(report.gc_ran);
        assert!(store.is_pinned(&ContentId::from("r3s0")));
        assert!(!store.is_pinned(&ContentId::from("r1s0")));
    }

    #[tokio::test]
    async fn demoted_winner_content_is_released_for_local_fallback() {
        let store = store_with(4..=4, 3);
        store.insert(ContentId::from("local-s0"), "local");
        store.set_faults(StoreFaults { fail_pins: [ContentId::from("r4s1")].into_iter().collect(), ..Default::default() });
        let manager = PinRetentionManager::new(store.clone(), Arc::new(MemoryStateStore::new()), 3, 0).expect("manager");
        let winner_ids: Vec<ContentId> = (0..3).map(|i| ContentId::new(format!("r4s{i}"))).collect();
        manager.realize(4, &winner_ids, 1_000_000_000, 0).await.expect_err("r4s1 fails");
        assert!(store.is_pinned(&ContentId::from("r4s0")));

        let local_segment = SegmentRef {
            track_id: TrackId::from("local"),
            segment_index: 0,
            content_id: ContentId::from("local-s0"),
            duration_ms: 6_000,
        };
        let local = Proposal::new(4, PeerId::from("me"), ProposalBody::Track { track_id: TrackId::from("local") }, vec![local_segment], 0);
        let fallback =
            ResolvedRound { round_id: 4, winner: Some(local), consensus_hash: None, is_fallback: true, candidate_count: 1, resolved_at_ns: 1 };
        manager.on_round_resolved(&fallback, 1).await.expect("fallback");
        let record = manager.snapshot().expect("snapshot").records.into_iter().find(|r| r.round_id == 4).expect("record");
        assert_eq!(record.content_ids, vec![ContentId::from("local-s0")]);

        store.set_faults(StoreFaults::default());
        let report = manager.cleanup(&HashSet::new(), 4).await.expect("cleanup");
        assert_eq!((report.unpinned, report.retried_pins), (3, 0));
        assert!(store.is_pinned(&ContentId::from("local-s0")));
        assert!(winner_ids.iter().all(|id| !store.is_pinned(id)));
        assert!(!manager.is_pinned(&ContentId::from("r4s0")));
    }

    #[tokio::test]
    async fn restart_restores_ledger() {
        let store = store_with(1..=2, 1);
        let state = Arc::new(MemoryStateStore::new());
        {
            let manager = PinRetentionManager::new(store.clone(), state.clone(), 1, 0).expect("manager");
            manager.on_round_resolved(&resolved(1, 1), 1).await.expect("r1");
            manager.on_round_resolved(&resolved(2, 1), 2).await.expect("r2");
        }
        let manager = PinRetentionManager::new(store.clone(), state, 1, 0).expect("restored");
        assert!(manager.is_pinned(&ContentId::from("r1s0")));
        manager.cleanup(&HashSet::new(), RoundId::MAX).await.expect("cleanup");
        assert!(!store.is_pinned(&ContentId::from("r1s0")));
        assert!(store.is_pinned(&ContentId::from("r2s0")));
    }
}
