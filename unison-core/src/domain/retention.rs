use crate::foundation::constants::DEFAULT_RETAINED_ROUNDS;
use crate::foundation::{ContentId, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub round_id: RoundId,
    pub content_ids: Vec<ContentId>,
    pub pinned_at_ns: u64,
}

/// Persisted as `pin_records.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinLedgerSnapshot {
    pub records: Vec<PinRecord>,
    #[serde(default)]
    pub pending_pins: BTreeSet<ContentId>,
    #[serde(default)]
    pub pending_unpins: BTreeSet<ContentId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    pub unpin: Vec<ContentId>,
    pub retry_pins: Vec<ContentId>,
    pub dropped_rounds: Vec<RoundId>,
}

impl CleanupPlan {
    pub fn is_empty(&self) -> bool {
        self.unpin.is_empty() && self.retry_pins.is_empty() && self.dropped_rounds.is_empty()
    }
}

/// Bookkeeping half of the pin retention manager: which rounds hold which pins, and what to release.
///
/// Records are kept in round order. Records from the playing round onward are never released.
/// Of the rounds already played, the newest `limit` are retained; an older record lingers only
/// for content ids still inside the active stream window.
#[derive(Clone, Debug)]
pub struct PinLedger {
    limit: usize,
    records: VecDeque<PinRecord>,
    pending_pins: BTreeSet<ContentId>,
    pending_unpins: BTreeSet<ContentId>,
}

impl Default for PinLedger {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED_ROUNDS)
    }
}

impl PinLedger {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1), records: VecDeque::new(), pending_pins: BTreeSet::new(), pending_unpins: BTreeSet::new() }
    }

    pub fn restore(limit: usize, snapshot: PinLedgerSnapshot) -> Self {
        let mut ledger = Self::new(limit);
        let mut records = snapshot.records;
        records.sort_by_key(|r| r.round_id);
        ledger.records = records.into();
        ledger.pending_pins = snapshot.pending_pins;
        ledger.pending_unpins = snapshot.pending_unpins;
        ledger
    }

    pub fn snapshot(&self) -> PinLedgerSnapshot {
        PinLedgerSnapshot {
            records: self.records.iter().cloned().collect(),
            pending_pins: self.pending_pins.clone(),
            pending_unpins: self.pending_unpins.clone(),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &PinRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds (or merges into) the record for `round_id`, keeping round order.
    pub fn record(&mut self, round_id: RoundId, content_ids: Vec<ContentId>, now_ns: u64) {
        for content_id in &content_ids {
            self.pending_unpins.remove(content_id);
        }
        if let Some(existing) = self.records.iter_mut().find(|r| r.round_id == round_id) {
            for content_id in content_ids {
                if !existing.content_ids.contains(&content_id) {
                    existing.content_ids.push(content_id);
                }
            }
            return;
        }
        let position = self.records.iter().position(|r| r.round_id > round_id).unwrap_or(self.records.len());
        self.records.insert(position, PinRecord { round_id, content_ids, pinned_at_ns: now_ns });
    }

    /// Swaps the content of `round_id` for what the round actually resolved to.
    ///
    /// Returns the ids that no record references any more. They are queued for unpinning and
    /// their pin retries are cancelled.
    pub fn replace(&mut self, round_id: RoundId, content_ids: Vec<ContentId>, now_ns: u64) -> Vec<ContentId> {
        let previous = match self.records.iter().position(|r| r.round_id == round_id) {
            Some(position) => self.records.remove(position).map(|r| r.content_ids).unwrap_or_default(),
            None => Vec::new(),
        };
        if !content_ids.is_empty() {
            self.record(round_id, content_ids, now_ns);
        }
        let live = self.live_content_ids();
        let released: Vec<ContentId> = previous.into_iter().filter(|id| !live.contains(id)).collect();
        for content_id in &released {
            self.pending_pins.remove(content_id);
            self.pending_unpins.insert(content_id.clone());
        }
        released
    }

    pub fn mark_pinned(&mut self, content_id: &ContentId) {
        self.pending_pins.remove(content_id);
    }

    pub fn mark_pin_failed(&mut self, content_id: ContentId) {
        self.pending_pins.insert(content_id);
    }

    pub fn mark_unpinned(&mut self, content_id: &ContentId) {
        self.pending_unpins.remove(content_id);
    }

    pub fn mark_unpin_failed(&mut self, content_id: ContentId) {
        self.pending_unpins.insert(content_id);
    }

    pub fn live_content_ids(&self) -> HashSet<ContentId> {
        self.records.iter().flat_map(|r| r.content_ids.iter().cloned()).collect()
    }

    /// Trims played records beyond the retention limit and returns the store calls to make.
    ///
    /// Records at or after `playing_round` are untouched. Content ids in `active_window` are
    /// never released; content ids shared with a retained record stay pinned under that record.
    pub fn plan_cleanup(&mut self, active_window: &HashSet<ContentId>, playing_round: RoundId) -> CleanupPlan {
        let mut plan = CleanupPlan::default();
        let played = self.records.iter().take_while(|r| r.round_id < playing_round).count();
        let excess = played.saturating_sub(self.limit);
        let newest: HashSet<ContentId> = self.records.iter().skip(excess).flat_map(|r| r.content_ids.iter().cloned()).collect();

        let mut unpin: BTreeSet<ContentId> = BTreeSet::new();
        let mut kept_old = VecDeque::new();
        for mut record in self.records.drain(..excess) {
            let mut lingering = Vec::new();
            for content_id in record.content_ids {
                if active_window.contains(&content_id) {
                    lingering.push(content_id);
                } else if !newest.contains(&content_id) {
                    unpin.insert(content_id);
                }
            }
            if lingering.is_empty() {
                plan.dropped_rounds.push(record.round_id);
            } else {
                record.content_ids = lingering;
                kept_old.push_back(record);
            }
        }
        while let Some(record) = kept_old.pop_back() {
            self.records.push_front(record);
        }

        // Retry earlier failures unless the content became live again.
        let live = self.live_content_ids();
        for content_id in std::mem::take(&mut self.pending_unpins) {
            if !live.contains(&content_id) && !active_window.contains(&content_id) {
                unpin.insert(content_id);
            }
        }
        for content_id in &unpin {
            self.pending_pins.remove(content_id);
        }
        self.pending_pins.retain(|content_id| live.contains(content_id));
        plan.retry_pins = self.pending_pins.iter().cloned().collect();
        plan.unpin = unpin.into_iter().collect();
        plan
    }
}
