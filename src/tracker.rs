//! Tracker variants over the range ledger, and the cross-context merge.
//!
//! A [`SiteTracker`] is owned by the consuming partition; a
//! [`BufferReceiverTracker`] accumulates in an independent receiving
//! context until it is folded into a site tracker. Both delegate to
//! [`RangeLedger`]; the [`TrackerView`] trait is the read-only seam
//! `merge_tracker` accepts either variant through.

use crate::identity::{DrId, PartitionId, UniqueId};
use crate::ledger::{LedgerError, RangeLedger, Span, TxnMarkers};

/// Read-only view of a tracker. Merge reads through this seam and copies;
/// the viewed tracker is never mutated and stays independently usable.
pub trait TrackerView {
    fn producer_partition_id(&self) -> PartitionId;

    fn ledger(&self) -> &RangeLedger;

    fn safe_point(&self) -> DrId {
        self.ledger().safe_point()
    }

    fn first_dr_id(&self) -> DrId {
        self.ledger().first_dr_id()
    }

    fn last_dr_id(&self) -> DrId {
        self.ledger().last_dr_id()
    }

    fn last_sp_unique_id(&self) -> UniqueId {
        self.ledger().last_markers().sp_unique_id
    }

    fn last_mp_unique_id(&self) -> UniqueId {
        self.ledger().last_markers().mp_unique_id
    }

    fn span_count(&self) -> usize {
        self.ledger().span_count()
    }

    fn contains(&self, start: DrId, end: DrId) -> bool {
        self.ledger().contains(start, end)
    }
}

/// Tracker bound to a consuming partition, carrying producer transaction
/// markers per span for failover consistency checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteTracker {
    partition_id: PartitionId,
    producer_partition_id: PartitionId,
    ledger: RangeLedger,
}

impl SiteTracker {
    pub fn new(
        partition_id: PartitionId,
        initial_safe_point: DrId,
        initial_sp_unique_id: UniqueId,
        initial_mp_unique_id: UniqueId,
        producer_partition_id: PartitionId,
    ) -> Self {
        Self {
            partition_id,
            producer_partition_id,
            ledger: RangeLedger::new(
                initial_safe_point,
                TxnMarkers::new(initial_sp_unique_id, initial_mp_unique_id),
            ),
        }
    }

    pub(crate) fn from_parts(
        partition_id: PartitionId,
        producer_partition_id: PartitionId,
        ledger: RangeLedger,
    ) -> Self {
        Self {
            partition_id,
            producer_partition_id,
            ledger,
        }
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn append(
        &mut self,
        start: DrId,
        end: DrId,
        sp_unique_id: UniqueId,
        mp_unique_id: UniqueId,
    ) -> Result<(), LedgerError> {
        self.ledger
            .append(start, end, TxnMarkers::new(sp_unique_id, mp_unique_id))
    }

    pub fn truncate(&mut self, target: DrId) -> DrId {
        self.ledger.truncate(target)
    }

    /// Markers of the record that closed out (or most recently advanced)
    /// the safe point.
    pub fn safe_point_markers(&self) -> TxnMarkers {
        self.ledger.safe_point_markers()
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.ledger.spans()
    }

    /// Fold a neighbor tracker of either variant into this one. The
    /// neighbor is read and copied, never mutated; overlap between the two
    /// interval sets is legal and resolved as a union.
    pub fn merge_tracker(&mut self, neighbor: &impl TrackerView) {
        self.ledger.merge_from(neighbor.ledger());
    }
}

impl TrackerView for SiteTracker {
    fn producer_partition_id(&self) -> PartitionId {
        self.producer_partition_id
    }

    fn ledger(&self) -> &RangeLedger {
        &self.ledger
    }
}

/// Lightweight tracker held by an independent receiving context before its
/// data is folded into a site tracker. Not bound to a consumer partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferReceiverTracker {
    producer_partition_id: PartitionId,
    ledger: RangeLedger,
}

impl BufferReceiverTracker {
    pub fn new(
        initial_safe_point: DrId,
        initial_sp_unique_id: UniqueId,
        initial_mp_unique_id: UniqueId,
        producer_partition_id: PartitionId,
    ) -> Self {
        Self {
            producer_partition_id,
            ledger: RangeLedger::new(
                initial_safe_point,
                TxnMarkers::new(initial_sp_unique_id, initial_mp_unique_id),
            ),
        }
    }

    pub(crate) fn from_parts(producer_partition_id: PartitionId, ledger: RangeLedger) -> Self {
        Self {
            producer_partition_id,
            ledger,
        }
    }

    pub fn append(
        &mut self,
        start: DrId,
        end: DrId,
        sp_unique_id: UniqueId,
        mp_unique_id: UniqueId,
    ) -> Result<(), LedgerError> {
        self.ledger
            .append(start, end, TxnMarkers::new(sp_unique_id, mp_unique_id))
    }

    pub fn truncate(&mut self, target: DrId) -> DrId {
        self.ledger.truncate(target)
    }

    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.ledger.spans()
    }
}

impl TrackerView for BufferReceiverTracker {
    fn producer_partition_id(&self) -> PartitionId {
        self.producer_partition_id
    }

    fn ledger(&self) -> &RangeLedger {
        &self.ledger
    }
}
