//! Per-session registry of site trackers.
//!
//! The consuming session owns one [`SiteTracker`] per (consumer partition,
//! producer partition) pair, constructed at DR session start and torn down
//! with the session. No process-wide registry exists; state exchange goes
//! through the digest document form.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::digest::{self, DigestError, TrackerMap};
use crate::identity::{ClusterId, DrId, PartitionId, UniqueId};
use crate::ledger::LedgerError;
use crate::tracker::{BufferReceiverTracker, SiteTracker, TrackerView};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("tracker already registered for consumer {consumer}, producer {producer}")]
    DuplicateTracker {
        consumer: PartitionId,
        producer: PartitionId,
    },
    #[error("no tracker for consumer {consumer}, producer {producer}")]
    UnknownTracker {
        consumer: PartitionId,
        producer: PartitionId,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Digest(#[from] DigestError),
}

/// A DR consumer session's tracker registry for one producer cluster.
#[derive(Debug)]
pub struct ConsumerSession {
    producer_cluster_id: ClusterId,
    trackers: BTreeMap<(PartitionId, PartitionId), SiteTracker>,
}

impl ConsumerSession {
    pub fn new(producer_cluster_id: ClusterId) -> Self {
        Self {
            producer_cluster_id,
            trackers: BTreeMap::new(),
        }
    }

    pub fn producer_cluster_id(&self) -> ClusterId {
        self.producer_cluster_id
    }

    /// Register a tracker for a (consumer, producer) pair, seeded with the
    /// last confirmed point of a prior generation.
    pub fn start_tracker(
        &mut self,
        consumer: PartitionId,
        producer: PartitionId,
        initial_safe_point: DrId,
        initial_sp_unique_id: UniqueId,
        initial_mp_unique_id: UniqueId,
    ) -> Result<&mut SiteTracker, SessionError> {
        if self.trackers.contains_key(&(consumer, producer)) {
            return Err(SessionError::DuplicateTracker { consumer, producer });
        }
        debug!(
            consumer = consumer.get(),
            producer = producer.get(),
            safe_point = initial_safe_point.get(),
            "starting dr tracker"
        );
        let tracker = SiteTracker::new(
            consumer,
            initial_safe_point,
            initial_sp_unique_id,
            initial_mp_unique_id,
            producer,
        );
        Ok(self
            .trackers
            .entry((consumer, producer))
            .or_insert(tracker))
    }

    pub fn tracker(&self, consumer: PartitionId, producer: PartitionId) -> Option<&SiteTracker> {
        self.trackers.get(&(consumer, producer))
    }

    pub fn tracker_mut(
        &mut self,
        consumer: PartitionId,
        producer: PartitionId,
    ) -> Option<&mut SiteTracker> {
        self.trackers.get_mut(&(consumer, producer))
    }

    /// Record a newly delivered run on the owning tracker.
    pub fn record(
        &mut self,
        consumer: PartitionId,
        producer: PartitionId,
        start: DrId,
        end: DrId,
        sp_unique_id: UniqueId,
        mp_unique_id: UniqueId,
    ) -> Result<(), SessionError> {
        let tracker = self
            .trackers
            .get_mut(&(consumer, producer))
            .ok_or(SessionError::UnknownTracker { consumer, producer })?;
        tracker.append(start, end, sp_unique_id, mp_unique_id)?;
        Ok(())
    }

    /// Fold a receiver-context tracker into the owning site tracker. The
    /// receiver is read-only and stays usable afterwards.
    pub fn fold_receiver(
        &mut self,
        consumer: PartitionId,
        receiver: &BufferReceiverTracker,
    ) -> Result<(), SessionError> {
        let producer = receiver.producer_partition_id();
        let tracker = self
            .trackers
            .get_mut(&(consumer, producer))
            .ok_or(SessionError::UnknownTracker { consumer, producer })?;
        tracker.merge_tracker(receiver);
        debug!(
            consumer = consumer.get(),
            producer = producer.get(),
            safe_point = tracker.safe_point().get(),
            "folded receiver tracker"
        );
        Ok(())
    }

    /// Downstream apply-path confirmation: truncate up to `target` and
    /// return the new safe point.
    pub fn acknowledge(
        &mut self,
        consumer: PartitionId,
        producer: PartitionId,
        target: DrId,
    ) -> Result<DrId, SessionError> {
        let tracker = self
            .trackers
            .get_mut(&(consumer, producer))
            .ok_or(SessionError::UnknownTracker { consumer, producer })?;
        let safe_point = tracker.truncate(target);
        debug!(
            consumer = consumer.get(),
            producer = producer.get(),
            target = target.get(),
            safe_point = safe_point.get(),
            "acknowledged dr progress"
        );
        Ok(safe_point)
    }

    /// Tear down the tracker for one producer partition, e.g. when the DR
    /// relationship is dropped.
    pub fn remove_tracker(
        &mut self,
        consumer: PartitionId,
        producer: PartitionId,
    ) -> Option<SiteTracker> {
        self.trackers.remove(&(consumer, producer))
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartitionId, PartitionId, &SiteTracker)> {
        self.trackers
            .iter()
            .map(|(&(consumer, producer), tracker)| (consumer, producer, tracker))
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Export all owned trackers as a digest document fragment.
    pub fn export_digest(&self) -> Result<serde_json::Value, SessionError> {
        let mut map = TrackerMap::new();
        for (&(consumer, producer), tracker) in &self.trackers {
            map.entry(consumer)
                .or_default()
                .entry(self.producer_cluster_id)
                .or_default()
                .insert(producer, tracker.clone());
        }
        Ok(digest::to_document(&map)?)
    }

    /// Restore trackers from a digest document fragment, replacing any
    /// already registered for the same pair. Entries for other producer
    /// clusters are ignored.
    pub fn import_digest(&mut self, doc: serde_json::Value) -> Result<(), SessionError> {
        let map = digest::from_document(doc)?;
        for (consumer, clusters) in map {
            for (cluster, producers) in clusters {
                if cluster != self.producer_cluster_id {
                    continue;
                }
                for (producer, tracker) in producers {
                    debug!(
                        consumer = consumer.get(),
                        producer = producer.get(),
                        safe_point = tracker.safe_point().get(),
                        "imported dr tracker"
                    );
                    self.trackers.insert((consumer, producer), tracker);
                }
            }
        }
        Ok(())
    }
}
