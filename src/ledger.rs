//! Gap-free coverage bookkeeping for received DrIds.
//!
//! A [`RangeLedger`] holds a confirmed prefix (the safe point) plus an
//! ordered set of pending spans: disjoint, ascending, never adjacent.
//! Adjacent appends coalesce immediately, so every stored span boundary is
//! a real gap in reception.

use std::collections::VecDeque;

use thiserror::Error;

use crate::identity::{DrId, UniqueId};

/// Producer transaction identifiers of the record that closed out a run of
/// DrIds. Consulted by failover promotion to decide which transactions are
/// safely committed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TxnMarkers {
    pub sp_unique_id: UniqueId,
    pub mp_unique_id: UniqueId,
}

impl TxnMarkers {
    pub fn new(sp_unique_id: UniqueId, mp_unique_id: UniqueId) -> Self {
        Self {
            sp_unique_id,
            mp_unique_id,
        }
    }

    /// Componentwise recency merge. Unique ids from one producer partition
    /// are monotone, so the larger value is the later transaction.
    pub fn latest(self, other: TxnMarkers) -> TxnMarkers {
        TxnMarkers {
            sp_unique_id: self.sp_unique_id.max(other.sp_unique_id),
            mp_unique_id: self.mp_unique_id.max(other.mp_unique_id),
        }
    }
}

/// One inclusive run `[start, end]` of contiguously received DrIds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    start: DrId,
    end: DrId,
    markers: TxnMarkers,
}

impl Span {
    pub fn new(start: DrId, end: DrId, markers: TxnMarkers) -> Result<Self, LedgerError> {
        if start > end {
            return Err(LedgerError::InvertedSpan { start, end });
        }
        Ok(Self {
            start,
            end,
            markers,
        })
    }

    fn point(at: DrId, markers: TxnMarkers) -> Self {
        Self {
            start: at,
            end: at,
            markers,
        }
    }

    pub fn start(&self) -> DrId {
        self.start
    }

    pub fn end(&self) -> DrId {
        self.end
    }

    pub fn markers(&self) -> TxnMarkers {
        self.markers
    }

    fn extend_to(&mut self, end: DrId, markers: TxnMarkers) {
        self.end = end;
        self.markers = markers;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Out-of-order or duplicate delivery: the span starts at or below
    /// coverage this ledger already holds. A protocol bug upstream, never
    /// recovered locally.
    #[error("span [{start}, {end}] overlaps coverage ending at {covered}")]
    OverlappingAppend {
        start: DrId,
        end: DrId,
        covered: DrId,
    },
    #[error("inverted span: start {start} > end {end}")]
    InvertedSpan { start: DrId, end: DrId },
}

/// Confirmed prefix plus pending spans for one producer partition.
///
/// `safe_point` is the highest DrId below which reception is certified
/// gap-free. Pending spans all start strictly above it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeLedger {
    safe_point: DrId,
    safe_point_markers: TxnMarkers,
    first_dr_id: Option<DrId>,
    last_markers: TxnMarkers,
    pending: VecDeque<Span>,
}

impl RangeLedger {
    pub fn new(initial_safe_point: DrId, initial_markers: TxnMarkers) -> Self {
        Self {
            safe_point: initial_safe_point,
            safe_point_markers: initial_markers,
            first_dr_id: None,
            last_markers: initial_markers,
            pending: VecDeque::new(),
        }
    }

    /// Rebuild a ledger from decoded spans, validating order and overlap.
    /// Adjacent spans coalesce as they would have on append; overlapping or
    /// inverted spans are rejected, never repaired.
    pub(crate) fn from_spans<I>(
        safe_point: DrId,
        last_markers: TxnMarkers,
        spans: I,
    ) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = Span>,
    {
        let mut ledger = Self::new(safe_point, last_markers);
        for span in spans {
            ledger.append(span.start, span.end, span.markers)?;
        }
        // Provenance is not carried on the wire; the accessor falls back to
        // the safe point.
        ledger.first_dr_id = None;
        ledger.last_markers = last_markers;
        Ok(ledger)
    }

    /// Record a newly received run. `start` must lie strictly beyond all
    /// existing coverage; a violation leaves the ledger unchanged.
    pub fn append(&mut self, start: DrId, end: DrId, markers: TxnMarkers) -> Result<(), LedgerError> {
        if start > end {
            return Err(LedgerError::InvertedSpan { start, end });
        }
        let covered = self.last_dr_id();
        if start <= covered {
            return Err(LedgerError::OverlappingAppend {
                start,
                end,
                covered,
            });
        }

        if self.first_dr_id.is_none() {
            self.first_dr_id = Some(start);
        }

        match self.pending.back_mut() {
            Some(last) if last.end().abuts(start) => last.extend_to(end, markers),
            _ => self.pending.push_back(Span {
                start,
                end,
                markers,
            }),
        }
        self.last_markers = markers;
        Ok(())
    }

    /// Confirm downstream durability up to `target` and advance the safe
    /// point as far as the data allows. Returns the (possibly unchanged)
    /// safe point.
    ///
    /// Every pending span whose start is reached collapses whole into the
    /// confirmed prefix; partial consumption of a span is not supported.
    /// With nothing pending, any larger target is immediately safe. Never
    /// decreases the safe point.
    pub fn truncate(&mut self, target: DrId) -> DrId {
        while self
            .pending
            .front()
            .is_some_and(|span| span.start() <= target)
        {
            if let Some(span) = self.pending.pop_front() {
                self.safe_point = span.end();
                self.safe_point_markers = span.markers();
            }
        }
        if self.pending.is_empty() && target > self.safe_point {
            self.safe_point = target;
            self.safe_point_markers = self.last_markers;
        }
        self.safe_point
    }

    /// True iff `[start, end]` lies entirely within the confirmed prefix or
    /// entirely within one pending span. Runs spanning a gap are not
    /// contained, even when both endpoints are.
    pub fn contains(&self, start: DrId, end: DrId) -> bool {
        if start > end {
            return false;
        }
        if end <= self.safe_point {
            return true;
        }
        self.pending
            .iter()
            .any(|span| span.start() <= start && end <= span.end())
    }

    pub fn safe_point(&self) -> DrId {
        self.safe_point
    }

    /// Markers of the record that most recently closed out (or advanced)
    /// the confirmed prefix.
    pub fn safe_point_markers(&self) -> TxnMarkers {
        self.safe_point_markers
    }

    /// Lowest DrId this ledger ever observed; frozen by the first append,
    /// unaffected by truncation. Falls back to the safe point when nothing
    /// was ever appended.
    pub fn first_dr_id(&self) -> DrId {
        self.first_dr_id.unwrap_or(self.safe_point)
    }

    /// Highest DrId currently known: end of the trailing span, or the safe
    /// point when nothing is pending.
    pub fn last_dr_id(&self) -> DrId {
        self.pending.back().map_or(self.safe_point, Span::end)
    }

    pub fn last_markers(&self) -> TxnMarkers {
        self.last_markers
    }

    pub fn span_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.pending.iter()
    }

    /// Fold a read-only neighbor ledger into this one: standard interval
    /// union with coalescing, overlap legal. Both safe points join the
    /// union as single-point runs, so the lowest bound from either input
    /// becomes the effective starting watermark; the union's first span
    /// ends at the new safe point and the rest stay pending.
    pub fn merge_from(&mut self, other: &RangeLedger) {
        let mut inputs: Vec<Span> =
            Vec::with_capacity(self.pending.len() + other.pending.len() + 2);
        inputs.push(Span::point(self.safe_point, self.safe_point_markers));
        inputs.extend(self.pending.iter().copied());
        inputs.push(Span::point(other.safe_point, other.safe_point_markers));
        inputs.extend(other.pending.iter().copied());
        inputs.sort_by_key(|span| (span.start(), span.end()));

        let mut merged: Vec<Span> = Vec::with_capacity(inputs.len());
        for span in inputs {
            match merged.last_mut() {
                Some(last) if span.start() <= last.end() || last.end().abuts(span.start()) => {
                    // The span that closes the merged run supplies its
                    // markers; a fully contained span changes nothing.
                    if span.end() > last.end() {
                        last.extend_to(span.end(), span.markers());
                    }
                }
                _ => merged.push(span),
            }
        }

        if self.first_dr_id.is_none() {
            self.first_dr_id = other.first_dr_id;
        }
        self.last_markers = self.last_markers.latest(other.last_markers);

        let mut spans = merged.into_iter();
        if let Some(first) = spans.next() {
            self.safe_point = first.end();
            self.safe_point_markers = first.markers();
        }
        self.pending = spans.collect();
    }
}
