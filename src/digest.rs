//! Structured document form for per-session tracker maps.
//!
//! A digest nests consumer partition → producer cluster → producer
//! partition → tracker fields, and is embedded in the larger snapshot
//! digest document by the snapshot writer. Integer map keys become JSON
//! string keys, as the original document format had.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{ClusterId, DrId, PartitionId, UniqueId};
use crate::ledger::{LedgerError, RangeLedger, Span, TxnMarkers};
use crate::tracker::{SiteTracker, TrackerView};

/// Nested tracker mapping as exchanged in snapshot digests and during DR
/// topology changes.
pub type TrackerMap = BTreeMap<PartitionId, BTreeMap<ClusterId, BTreeMap<PartitionId, SiteTracker>>>;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("digest document malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("digest span list invalid: {0}")]
    InvalidSpans(#[from] LedgerError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanDoc {
    pub start: DrId,
    pub end: DrId,
    pub sp_unique_id: UniqueId,
    pub mp_unique_id: UniqueId,
}

/// One tracker's field set inside a digest document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerDoc {
    pub partition_id: PartitionId,
    pub producer_partition_id: PartitionId,
    pub safe_point: DrId,
    pub last_sp_unique_id: UniqueId,
    pub last_mp_unique_id: UniqueId,
    pub spans: Vec<SpanDoc>,
}

impl TrackerDoc {
    pub fn from_tracker(tracker: &SiteTracker) -> Self {
        Self {
            partition_id: tracker.partition_id(),
            producer_partition_id: tracker.producer_partition_id(),
            safe_point: tracker.safe_point(),
            last_sp_unique_id: tracker.last_sp_unique_id(),
            last_mp_unique_id: tracker.last_mp_unique_id(),
            spans: tracker
                .spans()
                .map(|span| SpanDoc {
                    start: span.start(),
                    end: span.end(),
                    sp_unique_id: span.markers().sp_unique_id,
                    mp_unique_id: span.markers().mp_unique_id,
                })
                .collect(),
        }
    }

    /// Rebuild the tracker, rejecting overlapping, unsorted or inverted
    /// spans rather than repairing them.
    pub fn into_tracker(self) -> Result<SiteTracker, DigestError> {
        let last_markers = TxnMarkers::new(self.last_sp_unique_id, self.last_mp_unique_id);
        let spans = self
            .spans
            .into_iter()
            .map(|doc| {
                Span::new(
                    doc.start,
                    doc.end,
                    TxnMarkers::new(doc.sp_unique_id, doc.mp_unique_id),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ledger = RangeLedger::from_spans(self.safe_point, last_markers, spans)?;
        Ok(SiteTracker::from_parts(
            self.partition_id,
            self.producer_partition_id,
            ledger,
        ))
    }
}

/// Serialize a nested tracker mapping into a structured document.
pub fn to_document(map: &TrackerMap) -> Result<serde_json::Value, DigestError> {
    let docs: BTreeMap<PartitionId, BTreeMap<ClusterId, BTreeMap<PartitionId, TrackerDoc>>> = map
        .iter()
        .map(|(consumer, clusters)| {
            let clusters = clusters
                .iter()
                .map(|(cluster, producers)| {
                    let producers = producers
                        .iter()
                        .map(|(producer, tracker)| (*producer, TrackerDoc::from_tracker(tracker)))
                        .collect();
                    (*cluster, producers)
                })
                .collect();
            (*consumer, clusters)
        })
        .collect();
    Ok(serde_json::to_value(docs)?)
}

/// Reconstruct the nested tracker mapping from a digest document.
pub fn from_document(doc: serde_json::Value) -> Result<TrackerMap, DigestError> {
    let docs: BTreeMap<PartitionId, BTreeMap<ClusterId, BTreeMap<PartitionId, TrackerDoc>>> =
        serde_json::from_value(doc)?;

    let mut map = TrackerMap::new();
    for (consumer, clusters) in docs {
        let mut cluster_map = BTreeMap::new();
        for (cluster, producers) in clusters {
            let mut producer_map = BTreeMap::new();
            for (producer, doc) in producers {
                producer_map.insert(producer, doc.into_tracker()?);
            }
            cluster_map.insert(cluster, producer_map);
        }
        map.insert(consumer, cluster_map);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: i64) -> UniqueId {
        UniqueId::new(n)
    }

    fn sample_tracker(consumer: i32, producer: i32) -> SiteTracker {
        let mut tracker = SiteTracker::new(
            PartitionId::new(consumer),
            DrId::new(4),
            uid(40),
            uid(41),
            PartitionId::new(producer),
        );
        tracker
            .append(DrId::new(10), DrId::new(14), uid(50), uid(51))
            .unwrap();
        tracker
            .append(DrId::new(20), DrId::new(20), uid(60), uid(61))
            .unwrap();
        tracker
    }

    fn sample_map() -> TrackerMap {
        let mut map = TrackerMap::new();
        for consumer in [0, 1] {
            let mut clusters = BTreeMap::new();
            let mut producers = BTreeMap::new();
            for producer in [5, 6] {
                producers.insert(
                    PartitionId::new(producer),
                    sample_tracker(consumer, producer),
                );
            }
            clusters.insert(ClusterId::new(12), producers);
            map.insert(PartitionId::new(consumer), clusters);
        }
        map
    }

    #[test]
    fn document_round_trip() {
        let map = sample_map();
        let doc = to_document(&map).unwrap();
        let back = from_document(doc).unwrap();

        assert_eq!(back.len(), map.len());
        for (consumer, clusters) in &map {
            for (cluster, producers) in clusters {
                for (producer, tracker) in producers {
                    let restored = &back[consumer][cluster][producer];
                    assert_eq!(restored.partition_id(), tracker.partition_id());
                    assert_eq!(restored.safe_point(), tracker.safe_point());
                    assert_eq!(restored.last_sp_unique_id(), tracker.last_sp_unique_id());
                    assert_eq!(restored.last_mp_unique_id(), tracker.last_mp_unique_id());
                    let spans: Vec<_> = restored.spans().copied().collect();
                    let expected: Vec<_> = tracker.spans().copied().collect();
                    assert_eq!(spans, expected);
                }
            }
        }
    }

    #[test]
    fn keys_become_json_strings() {
        let doc = to_document(&sample_map()).unwrap();
        assert!(doc.get("0").is_some());
        assert!(doc["0"].get("12").is_some());
        assert!(doc["0"]["12"].get("5").is_some());
        assert_eq!(doc["0"]["12"]["5"]["safe_point"], 4);
    }

    #[test]
    fn rejects_overlapping_spans_in_document() {
        let doc = serde_json::json!({
            "0": { "12": { "5": {
                "partition_id": 0,
                "producer_partition_id": 5,
                "safe_point": -1,
                "last_sp_unique_id": 0,
                "last_mp_unique_id": 0,
                "spans": [
                    { "start": 10, "end": 20, "sp_unique_id": 0, "mp_unique_id": 0 },
                    { "start": 15, "end": 25, "sp_unique_id": 0, "mp_unique_id": 0 },
                ],
            }}}
        });
        let err = from_document(doc).unwrap_err();
        assert!(matches!(err, DigestError::InvalidSpans(_)));
    }

    #[test]
    fn rejects_structurally_malformed_document() {
        let doc = serde_json::json!({ "0": { "12": { "5": { "safe_point": "not a number" }}}});
        let err = from_document(doc).unwrap_err();
        assert!(matches!(err, DigestError::Json(_)));
    }

    #[test]
    fn empty_tracker_round_trips() {
        let tracker = SiteTracker::new(
            PartitionId::new(2),
            DrId::new(99),
            uid(1),
            uid(2),
            PartitionId::new(3),
        );
        let doc = TrackerDoc::from_tracker(&tracker);
        let back = doc.into_tracker().unwrap();
        assert_eq!(back.safe_point(), DrId::new(99));
        assert_eq!(back.span_count(), 0);
        assert_eq!(back.last_sp_unique_id(), uid(1));
    }
}
