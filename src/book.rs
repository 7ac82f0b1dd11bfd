//! Per-symbol order-book state machine: snapshot+delta reconciliation at a
//! fixed internal depth, with a change/heartbeat publication policy.
//!
//! `BookState` carries all four states named by the data model, but only
//! `Init` and `Valid` are ever observed between calls — `Syncing` is the
//! in-progress replay inside [`SymbolBook::on_snapshot`] and `Invalid` is
//! resolved to `Init` within the same call that detects the gap, emitting
//! its one marker before returning. See DESIGN.md for why that atomic
//! resolution was chosen over persisting an observable `Invalid` state.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Internal tracked depth per side. Deliberately wider than the published L1
/// so a handful of deletes near the top can't empty the book before the next
/// delta arrives.
pub const BOOK_DEPTH: usize = 5;

/// Idle threshold before a VALID, unchanged book still gets republished.
pub const HEARTBEAT_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub price: f64,
    pub qty: f64,
}

impl Level {
    const fn empty() -> Self {
        Level { price: 0.0, qty: 0.0 }
    }

    fn is_empty(&self) -> bool {
        self.qty == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    Init,
    Syncing,
    Valid,
    Invalid,
}

/// A depth delta buffered while a symbol has no snapshot installed yet.
#[derive(Debug, Clone)]
pub struct BufferedDelta {
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub exch_event_time_ms: i64,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

/// A REST snapshot response: `bids` sorted high→low, `asks` low→high.
#[derive(Debug, Clone)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookCandidate {
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Appended to the replay buffer; a snapshot is already in flight.
    Buffered,
    /// Appended to the replay buffer; caller must request a snapshot.
    SnapshotNeeded,
    /// A sequence gap was detected; book reset to INIT, caller must publish
    /// exactly one invalid L1 marker and request a fresh snapshot on the
    /// symbol's next delta.
    Invalidated,
    /// Delta applied; book state advanced.
    Applied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Synced,
    /// A gap surfaced while replaying the buffer against the snapshot.
    Invalidated,
}

fn beats(is_bid: bool, candidate_price: f64, existing_price: f64) -> bool {
    if is_bid {
        candidate_price > existing_price
    } else {
        candidate_price < existing_price
    }
}

/// Applies a single (price, qty) update to one side of the book, per the
/// level-update algorithm: replace/delete in place on a price match, else
/// insert in rank order and drop anything beyond the tracked depth.
fn apply_level_update(levels: &mut [Level; BOOK_DEPTH], price: f64, qty: f64, is_bid: bool) {
    if let Some(idx) = levels.iter().position(|l| !l.is_empty() && l.price == price) {
        if qty == 0.0 {
            for i in idx..BOOK_DEPTH - 1 {
                levels[i] = levels[i + 1];
            }
            levels[BOOK_DEPTH - 1] = Level::empty();
        } else {
            levels[idx].qty = qty;
        }
        return;
    }
    if qty <= 0.0 {
        return;
    }
    let mut insert_at = BOOK_DEPTH;
    for (i, level) in levels.iter().enumerate() {
        if level.is_empty() || beats(is_bid, price, level.price) {
            insert_at = i;
            break;
        }
    }
    if insert_at == BOOK_DEPTH {
        return;
    }
    for i in (insert_at + 1..BOOK_DEPTH).rev() {
        levels[i] = levels[i - 1];
    }
    levels[insert_at] = Level { price, qty };
}

fn install_top_d(levels: &[(f64, f64)]) -> [Level; BOOK_DEPTH] {
    let mut out = [Level::empty(); BOOK_DEPTH];
    for (slot, &(price, qty)) in out.iter_mut().zip(levels.iter()) {
        if qty > 0.0 {
            *slot = Level { price, qty };
        }
    }
    out
}

/// Per-symbol engine state: the book itself, the replay buffer, and the
/// last-published cache used to decide whether a given candidate is worth
/// sending.
pub struct SymbolBook {
    state: BookState,
    last_update_id: u64,
    bids: [Level; BOOK_DEPTH],
    asks: [Level; BOOK_DEPTH],
    buffer: VecDeque<BufferedDelta>,
    snapshot_in_flight: bool,
    last_published: Option<BookCandidate>,
    last_publish_at: Option<Instant>,
}

impl Default for SymbolBook {
    fn default() -> Self {
        Self {
            state: BookState::Init,
            last_update_id: 0,
            bids: [Level::empty(); BOOK_DEPTH],
            asks: [Level::empty(); BOOK_DEPTH],
            buffer: VecDeque::new(),
            snapshot_in_flight: false,
            last_published: None,
            last_publish_at: None,
        }
    }
}

impl SymbolBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BookState {
        self.state
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    /// Resets to INIT, per §4.3.6 (new WS connection) and as the terminal
    /// step of an invalidation. Clears the replay buffer and publish cache.
    pub fn reset(&mut self) {
        self.state = BookState::Init;
        self.last_update_id = 0;
        self.bids = [Level::empty(); BOOK_DEPTH];
        self.asks = [Level::empty(); BOOK_DEPTH];
        self.buffer.clear();
        self.snapshot_in_flight = false;
        self.last_published = None;
        self.last_publish_at = None;
    }

    fn apply_levels(&mut self, bids: &[(f64, f64)], asks: &[(f64, f64)]) {
        for &(price, qty) in bids {
            apply_level_update(&mut self.bids, price, qty, true);
        }
        for &(price, qty) in asks {
            apply_level_update(&mut self.asks, price, qty, false);
        }
    }

    /// Feeds one inbound delta through the state machine (§4.3.2).
    pub fn on_delta(&mut self, delta: BufferedDelta) -> DeltaOutcome {
        match self.state {
            BookState::Init => {
                let need_snapshot = !self.snapshot_in_flight;
                self.snapshot_in_flight = true;
                self.buffer.push_back(delta);
                if need_snapshot {
                    DeltaOutcome::SnapshotNeeded
                } else {
                    DeltaOutcome::Buffered
                }
            }
            BookState::Valid => {
                if delta.first_update_id == self.last_update_id + 1 {
                    self.apply_levels(&delta.bids, &delta.asks);
                    self.last_update_id = delta.final_update_id;
                    DeltaOutcome::Applied
                } else {
                    self.invalidate();
                    DeltaOutcome::Invalidated
                }
            }
            BookState::Syncing | BookState::Invalid => {
                // Transient states resolved synchronously inside on_snapshot /
                // invalidate; on_delta never observes them.
                unreachable!("SymbolBook never parks in Syncing/Invalid across calls")
            }
        }
    }

    fn invalidate(&mut self) {
        self.state = BookState::Init;
        self.last_update_id = 0;
        self.bids = [Level::empty(); BOOK_DEPTH];
        self.asks = [Level::empty(); BOOK_DEPTH];
        self.buffer.clear();
        self.snapshot_in_flight = false;
    }

    /// Installs a snapshot and replays the buffered deltas (§4.3.2 / §4.3.4).
    pub fn on_snapshot(&mut self, snapshot: DepthSnapshot) -> SnapshotOutcome {
        self.bids = install_top_d(&snapshot.bids);
        self.asks = install_top_d(&snapshot.asks);
        self.last_update_id = snapshot.last_update_id;
        self.snapshot_in_flight = false;

        let buffered = std::mem::take(&mut self.buffer);
        let mut gap = false;
        for delta in buffered {
            if delta.final_update_id <= self.last_update_id {
                continue; // wholly stale relative to the snapshot, drop.
            }
            if delta.first_update_id > self.last_update_id + 1 {
                gap = true;
                break;
            }
            self.apply_levels(&delta.bids, &delta.asks);
            self.last_update_id = delta.final_update_id;
        }
        self.buffer.clear();

        if gap {
            self.invalidate();
            SnapshotOutcome::Invalidated
        } else {
            self.state = BookState::Valid;
            SnapshotOutcome::Synced
        }
    }

    /// Clears the in-flight flag after a failed snapshot fetch, so the next
    /// buffered delta re-requests one (§4.3.4: "re-request is attempted on
    /// the next arriving delta").
    pub fn snapshot_fetch_failed(&mut self) {
        self.snapshot_in_flight = false;
    }

    /// The current best-bid/best-ask candidate, tagged with book validity.
    pub fn candidate(&self) -> BookCandidate {
        BookCandidate {
            bid_price: self.bids[0].price,
            bid_qty: self.bids[0].qty,
            ask_price: self.asks[0].price,
            ask_qty: self.asks[0].qty,
            is_valid: self.state == BookState::Valid,
        }
    }

    /// The zeroed, `isValid=false` marker published exactly once per
    /// invalidation (§4.3.5, property 5).
    pub fn invalid_candidate() -> BookCandidate {
        BookCandidate {
            bid_price: 0.0,
            bid_qty: 0.0,
            ask_price: 0.0,
            ask_qty: 0.0,
            is_valid: false,
        }
    }

    /// Decides whether `candidate` is worth publishing against the cache
    /// (§4.3.5). The invalid marker is always published unconditionally by
    /// the caller rather than routed through this check.
    pub fn should_publish(&self, candidate: &BookCandidate, now: Instant) -> bool {
        let Some(prev) = self.last_published else {
            return true;
        };
        if prev.is_valid != candidate.is_valid {
            return true;
        }
        if !candidate.is_valid {
            return false;
        }
        if prev.bid_price != candidate.bid_price
            || prev.bid_qty != candidate.bid_qty
            || prev.ask_price != candidate.ask_price
            || prev.ask_qty != candidate.ask_qty
        {
            return true;
        }
        match self.last_publish_at {
            Some(t) => now.duration_since(t) >= Duration::from_millis(HEARTBEAT_MS),
            None => true,
        }
    }

    pub fn record_publish(&mut self, candidate: BookCandidate, now: Instant) {
        self.last_published = Some(candidate);
        self.last_publish_at = Some(now);
    }

    /// True once this symbol has gone idle long enough while VALID to owe a
    /// heartbeat republish of its unchanged L1.
    pub fn is_heartbeat_due(&self, now: Instant) -> bool {
        if self.state != BookState::Valid {
            return false;
        }
        match self.last_publish_at {
            Some(t) => now.duration_since(t) >= Duration::from_millis(HEARTBEAT_MS),
            None => false,
        }
    }
}

/// Owns every symbol's book, indexed by the dense `SymbolTable` index.
pub struct OrderBookEngine {
    books: Vec<SymbolBook>,
}

impl OrderBookEngine {
    pub fn new(symbol_count: usize) -> Self {
        Self {
            books: (0..symbol_count).map(|_| SymbolBook::new()).collect(),
        }
    }

    pub fn book(&self, idx: usize) -> &SymbolBook {
        &self.books[idx]
    }

    pub fn book_mut(&mut self, idx: usize) -> &mut SymbolBook {
        &mut self.books[idx]
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Resets every symbol to INIT; called on WS reconnect (§4.3.6).
    pub fn reset_all(&mut self) {
        for book in &mut self.books {
            book.reset();
        }
    }

    /// Indices of symbols whose VALID book has gone idle past the heartbeat
    /// threshold; scanned after each inbound frame (§4.3.5).
    pub fn heartbeat_due(&self, now: Instant) -> impl Iterator<Item = usize> + '_ {
        self.books
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.is_heartbeat_due(now))
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(u: u64, uu: u64, bids: &[(f64, f64)], asks: &[(f64, f64)]) -> BufferedDelta {
        BufferedDelta {
            first_update_id: u,
            final_update_id: uu,
            exch_event_time_ms: 1,
            bids: bids.to_vec(),
            asks: asks.to_vec(),
        }
    }

    #[test]
    fn s2_happy_path_reconciliation() {
        let mut book = SymbolBook::new();
        assert_eq!(
            book.on_delta(delta(10, 12, &[(30000.0, 1.0)], &[(30001.0, 2.0)])),
            DeltaOutcome::SnapshotNeeded
        );
        assert_eq!(book.state(), BookState::Init);

        let snap = DepthSnapshot {
            last_update_id: 11,
            bids: vec![(30000.0, 5.0), (29999.0, 3.0)],
            asks: vec![(30001.0, 4.0), (30002.0, 2.0)],
        };
        assert_eq!(book.on_snapshot(snap), SnapshotOutcome::Synced);
        assert_eq!(book.state(), BookState::Valid);
        assert_eq!(book.last_update_id(), 12);

        let candidate = book.candidate();
        assert_eq!(candidate.bid_price, 30000.0);
        assert_eq!(candidate.bid_qty, 1.0); // overwritten by the buffered delta
        assert_eq!(candidate.ask_price, 30001.0);
        assert_eq!(candidate.ask_qty, 2.0);
        assert!(candidate.is_valid);
    }

    #[test]
    fn s3_stale_delta_dropped_during_replay() {
        let mut book = SymbolBook::new();
        book.on_delta(delta(1, 5, &[], &[]));
        let snap = DepthSnapshot {
            last_update_id: 20,
            bids: vec![(100.0, 1.0)],
            asks: vec![(101.0, 1.0)],
        };
        // Stale buffered delta (u=5 < 20) must drop silently, not invalidate.
        assert_eq!(book.on_snapshot(snap), SnapshotOutcome::Synced);
        assert_eq!(book.state(), BookState::Valid);
        assert_eq!(book.last_update_id(), 20);
    }

    #[test]
    fn s4_sequence_gap_invalidates_and_resets() {
        let mut book = SymbolBook::new();
        book.on_delta(delta(1, 1, &[], &[]));
        book.on_snapshot(DepthSnapshot {
            last_update_id: 50,
            bids: vec![(100.0, 1.0)],
            asks: vec![(101.0, 1.0)],
        });
        assert_eq!(book.state(), BookState::Valid);

        let outcome = book.on_delta(delta(52, 55, &[], &[]));
        assert_eq!(outcome, DeltaOutcome::Invalidated);
        assert_eq!(book.state(), BookState::Init);
        assert_eq!(book.last_update_id(), 0);
    }

    #[test]
    fn depth_bound_and_ordering_hold_under_churn() {
        let mut book = SymbolBook::new();
        book.on_delta(delta(1, 1, &[], &[]));
        book.on_snapshot(DepthSnapshot {
            last_update_id: 0,
            bids: vec![],
            asks: vec![],
        });
        book.apply_levels(
            &[(10.0, 1.0), (9.0, 1.0), (8.0, 1.0), (7.0, 1.0), (6.0, 1.0), (5.0, 1.0)],
            &[(11.0, 1.0), (12.0, 1.0), (13.0, 1.0), (14.0, 1.0), (15.0, 1.0), (16.0, 1.0)],
        );
        let bids: Vec<f64> = book.bids.iter().filter(|l| !l.is_empty()).map(|l| l.price).collect();
        let asks: Vec<f64> = book.asks.iter().filter(|l| !l.is_empty()).map(|l| l.price).collect();
        assert!(bids.len() <= BOOK_DEPTH);
        assert!(asks.len() <= BOOK_DEPTH);
        assert!(bids.windows(2).all(|w| w[0] > w[1]));
        assert!(asks.windows(2).all(|w| w[0] < w[1]));
        assert!(bids[0] < asks[0]);
    }

    #[test]
    fn qty_zero_delete_shifts_levels_up() {
        let mut book = SymbolBook::new();
        book.apply_levels(&[(10.0, 1.0), (9.0, 1.0), (8.0, 1.0)], &[]);
        book.apply_levels(&[(9.0, 0.0)], &[]);
        let bids: Vec<f64> = book.bids.iter().filter(|l| !l.is_empty()).map(|l| l.price).collect();
        assert_eq!(bids, vec![10.0, 8.0]);
    }

    #[test]
    fn heartbeat_republishes_unchanged_book_after_idle() {
        let mut book = SymbolBook::new();
        book.on_delta(delta(1, 1, &[], &[]));
        book.on_snapshot(DepthSnapshot {
            last_update_id: 0,
            bids: vec![(100.0, 1.0)],
            asks: vec![(101.0, 1.0)],
        });
        let t0 = Instant::now();
        let candidate = book.candidate();
        assert!(book.should_publish(&candidate, t0));
        book.record_publish(candidate, t0);
        assert!(!book.should_publish(&candidate, t0 + Duration::from_millis(10)));
        assert!(book.should_publish(&candidate, t0 + Duration::from_millis(51)));
    }

    #[test]
    fn invalid_marker_publishes_exactly_once_per_invalidation() {
        let mut book = SymbolBook::new();
        book.on_delta(delta(1, 1, &[], &[]));
        book.on_snapshot(DepthSnapshot {
            last_update_id: 50,
            bids: vec![(100.0, 1.0)],
            asks: vec![(101.0, 1.0)],
        });
        let t0 = Instant::now();
        let valid_candidate = book.candidate();
        book.record_publish(valid_candidate, t0);

        let outcome = book.on_delta(delta(52, 55, &[], &[]));
        assert_eq!(outcome, DeltaOutcome::Invalidated);
        let invalid = SymbolBook::invalid_candidate();
        assert!(book.should_publish(&invalid, t0));
        book.record_publish(invalid, t0);
        // A second identical invalid candidate must not republish.
        assert!(!book.should_publish(&invalid, t0 + Duration::from_millis(1)));
    }
}
