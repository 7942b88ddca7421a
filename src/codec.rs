//! Binary wire/snapshot form for trackers.
//!
//! Big-endian, fixed layout: a one-byte variant tag, the identity headers,
//! the scalar safe point and last transaction markers, then the span list.
//! Site-form span records carry per-span markers; receiver-form records do
//! not. Decode validates every field and refuses to repair — a corrupt
//! stream must never weaken the safe-point computation.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::identity::{DrId, PartitionId, UniqueId};
use crate::ledger::{LedgerError, RangeLedger, Span, TxnMarkers};
use crate::tracker::{BufferReceiverTracker, SiteTracker, TrackerView};

const TAG_SITE: u8 = 1;
const TAG_RECEIVER: u8 = 2;

/// tag + partition id + producer partition id
const SITE_HEADER_BYTES: usize = 1 + 4 + 4;
/// tag + producer partition id
const RECEIVER_HEADER_BYTES: usize = 1 + 4;
/// safe point + last sp/mp unique ids + span count
const SCALAR_BYTES: usize = 8 + 8 + 8 + 4;
const SITE_SPAN_BYTES: usize = 8 + 8 + 8 + 8;
const RECEIVER_SPAN_BYTES: usize = 8 + 8;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown tracker tag: {0}")]
    UnknownTag(u8),
    #[error("buffer truncated reading {0}")]
    Truncated(&'static str),
    #[error("negative span count: {0}")]
    NegativeSpanCount(i32),
    #[error("span list invalid: {0}")]
    InvalidSpans(#[from] LedgerError),
    #[error("trailing bytes after tracker")]
    TrailingBytes,
}

impl SiteTracker {
    /// Exact length [`serialize`](Self::serialize) will write.
    pub fn serialized_size(&self) -> usize {
        SITE_HEADER_BYTES + SCALAR_BYTES + self.span_count() * SITE_SPAN_BYTES
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(TAG_SITE);
        buf.put_i32(self.partition_id().get());
        buf.put_i32(self.producer_partition_id().get());
        put_scalars(buf, self.ledger());
        for span in self.spans() {
            buf.put_i64(span.start().get());
            buf.put_i64(span.end().get());
            buf.put_i64(span.markers().sp_unique_id.get());
            buf.put_i64(span.markers().mp_unique_id.get());
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_size());
        self.serialize(&mut buf);
        buf.freeze()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut buf = bytes;
        expect_tag(&mut buf, TAG_SITE)?;
        let partition_id = PartitionId::new(read_i32(&mut buf, "partition id")?);
        let producer_partition_id = PartitionId::new(read_i32(&mut buf, "producer partition id")?);
        let (safe_point, last_markers, count) = read_scalars(&mut buf)?;

        check_span_capacity(&buf, count, SITE_SPAN_BYTES)?;
        let mut spans = Vec::with_capacity(count);
        for _ in 0..count {
            let start = DrId::new(read_i64(&mut buf, "span start")?);
            let end = DrId::new(read_i64(&mut buf, "span end")?);
            let sp = UniqueId::new(read_i64(&mut buf, "span sp unique id")?);
            let mp = UniqueId::new(read_i64(&mut buf, "span mp unique id")?);
            spans.push(Span::new(start, end, TxnMarkers::new(sp, mp))?);
        }
        expect_consumed(&buf)?;

        let ledger = RangeLedger::from_spans(safe_point, last_markers, spans)?;
        Ok(SiteTracker::from_parts(
            partition_id,
            producer_partition_id,
            ledger,
        ))
    }
}

impl BufferReceiverTracker {
    pub fn serialized_size(&self) -> usize {
        RECEIVER_HEADER_BYTES + SCALAR_BYTES + self.span_count() * RECEIVER_SPAN_BYTES
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(TAG_RECEIVER);
        buf.put_i32(self.producer_partition_id().get());
        put_scalars(buf, self.ledger());
        for span in self.spans() {
            buf.put_i64(span.start().get());
            buf.put_i64(span.end().get());
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_size());
        self.serialize(&mut buf);
        buf.freeze()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut buf = bytes;
        expect_tag(&mut buf, TAG_RECEIVER)?;
        let producer_partition_id = PartitionId::new(read_i32(&mut buf, "producer partition id")?);
        let (safe_point, last_markers, count) = read_scalars(&mut buf)?;

        check_span_capacity(&buf, count, RECEIVER_SPAN_BYTES)?;
        let mut spans = Vec::with_capacity(count);
        for _ in 0..count {
            let start = DrId::new(read_i64(&mut buf, "span start")?);
            let end = DrId::new(read_i64(&mut buf, "span end")?);
            // the receiver wire form carries no per-span markers; the
            // scalar trailing markers are the best available stand-in
            spans.push(Span::new(start, end, last_markers)?);
        }
        expect_consumed(&buf)?;

        let ledger = RangeLedger::from_spans(safe_point, last_markers, spans)?;
        Ok(BufferReceiverTracker::from_parts(
            producer_partition_id,
            ledger,
        ))
    }
}

fn put_scalars(buf: &mut impl BufMut, ledger: &RangeLedger) {
    buf.put_i64(ledger.safe_point().get());
    buf.put_i64(ledger.last_markers().sp_unique_id.get());
    buf.put_i64(ledger.last_markers().mp_unique_id.get());
    buf.put_i32(ledger.span_count() as i32);
}

fn read_scalars(buf: &mut &[u8]) -> Result<(DrId, TxnMarkers, usize), CodecError> {
    let safe_point = DrId::new(read_i64(buf, "safe point")?);
    let sp = UniqueId::new(read_i64(buf, "last sp unique id")?);
    let mp = UniqueId::new(read_i64(buf, "last mp unique id")?);
    let count = read_i32(buf, "span count")?;
    if count < 0 {
        return Err(CodecError::NegativeSpanCount(count));
    }
    Ok((safe_point, TxnMarkers::new(sp, mp), count as usize))
}

fn expect_tag(buf: &mut &[u8], expected: u8) -> Result<(), CodecError> {
    if buf.remaining() < 1 {
        return Err(CodecError::Truncated("tracker tag"));
    }
    let tag = buf.get_u8();
    if tag != expected {
        return Err(CodecError::UnknownTag(tag));
    }
    Ok(())
}

fn check_span_capacity(buf: &[u8], count: usize, record_bytes: usize) -> Result<(), CodecError> {
    if buf.remaining() < count * record_bytes {
        return Err(CodecError::Truncated("span records"));
    }
    Ok(())
}

fn expect_consumed(buf: &[u8]) -> Result<(), CodecError> {
    if buf.has_remaining() {
        return Err(CodecError::TrailingBytes);
    }
    Ok(())
}

fn read_i32(buf: &mut &[u8], field: &'static str) -> Result<i32, CodecError> {
    if buf.remaining() < 4 {
        return Err(CodecError::Truncated(field));
    }
    Ok(buf.get_i32())
}

fn read_i64(buf: &mut &[u8], field: &'static str) -> Result<i64, CodecError> {
    if buf.remaining() < 8 {
        return Err(CodecError::Truncated(field));
    }
    Ok(buf.get_i64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: i64) -> UniqueId {
        UniqueId::new(n)
    }

    fn sample_site() -> SiteTracker {
        let mut tracker = SiteTracker::new(
            PartitionId::new(3),
            DrId::new(17),
            uid(1000),
            uid(2000),
            PartitionId::new(9),
        );
        tracker
            .append(DrId::new(20), DrId::new(25), uid(1001), uid(2001))
            .unwrap();
        tracker
            .append(DrId::new(30), DrId::new(30), uid(1002), uid(2002))
            .unwrap();
        tracker
    }

    fn bounds(tracker: &impl TrackerView) -> Vec<(i64, i64)> {
        tracker
            .ledger()
            .spans()
            .map(|span| (span.start().get(), span.end().get()))
            .collect()
    }

    #[test]
    fn site_round_trip() {
        let tracker = sample_site();
        let bytes = tracker.to_bytes();
        assert_eq!(bytes.len(), tracker.serialized_size());

        let back = SiteTracker::deserialize(&bytes).unwrap();
        assert_eq!(back.partition_id(), tracker.partition_id());
        assert_eq!(
            back.producer_partition_id(),
            tracker.producer_partition_id()
        );
        assert_eq!(back.safe_point(), tracker.safe_point());
        assert_eq!(back.last_sp_unique_id(), tracker.last_sp_unique_id());
        assert_eq!(back.last_mp_unique_id(), tracker.last_mp_unique_id());
        assert_eq!(bounds(&back), bounds(&tracker));
        // per-span markers survive the site form
        let markers: Vec<_> = back.spans().map(Span::markers).collect();
        let expected: Vec<_> = tracker.spans().map(Span::markers).collect();
        assert_eq!(markers, expected);
    }

    #[test]
    fn empty_site_round_trip() {
        let tracker = SiteTracker::new(
            PartitionId::new(0),
            DrId::new(-1),
            uid(0),
            uid(0),
            PartitionId::new(1),
        );
        let bytes = tracker.to_bytes();
        assert_eq!(bytes.len(), SITE_HEADER_BYTES + SCALAR_BYTES);
        let back = SiteTracker::deserialize(&bytes).unwrap();
        assert_eq!(back.safe_point(), DrId::new(-1));
        assert_eq!(back.span_count(), 0);
    }

    #[test]
    fn receiver_round_trip() {
        let mut tracker =
            BufferReceiverTracker::new(DrId::new(5), uid(7), uid(8), PartitionId::new(2));
        tracker
            .append(DrId::new(10), DrId::new(12), uid(9), uid(10))
            .unwrap();
        let bytes = tracker.to_bytes();
        assert_eq!(bytes.len(), tracker.serialized_size());

        let back = BufferReceiverTracker::deserialize(&bytes).unwrap();
        assert_eq!(back.producer_partition_id(), PartitionId::new(2));
        assert_eq!(back.safe_point(), DrId::new(5));
        assert_eq!(back.last_sp_unique_id(), uid(9));
        assert_eq!(back.last_mp_unique_id(), uid(10));
        assert_eq!(bounds(&back), vec![(10, 12)]);
    }

    #[test]
    fn exact_byte_layout() {
        let mut tracker = SiteTracker::new(
            PartitionId::new(1),
            DrId::new(-1),
            uid(0),
            uid(0),
            PartitionId::new(2),
        );
        tracker
            .append(DrId::new(5), DrId::new(9), uid(3), uid(4))
            .unwrap();

        let bytes = tracker.to_bytes();
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            1,                                              // site tag
            0, 0, 0, 1,                                     // partition id
            0, 0, 0, 2,                                     // producer partition id
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // safe point -1
            0, 0, 0, 0, 0, 0, 0, 3,                         // last sp unique id
            0, 0, 0, 0, 0, 0, 0, 4,                         // last mp unique id
            0, 0, 0, 1,                                     // span count
            0, 0, 0, 0, 0, 0, 0, 5,                         // span start
            0, 0, 0, 0, 0, 0, 0, 9,                         // span end
            0, 0, 0, 0, 0, 0, 0, 3,                         // span sp unique id
            0, 0, 0, 0, 0, 0, 0, 4,                         // span mp unique id
        ];
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut bytes = sample_site().to_bytes().to_vec();
        bytes[0] = 9;
        let err = SiteTracker::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag(9)));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let bytes = sample_site().to_bytes();
        for len in 0..bytes.len() {
            let err = SiteTracker::deserialize(&bytes[..len]).unwrap_err();
            assert!(
                matches!(err, CodecError::Truncated(_)),
                "unexpected error at length {len}: {err}"
            );
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = sample_site().to_bytes().to_vec();
        bytes.push(0);
        let err = SiteTracker::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::TrailingBytes));
    }

    #[test]
    fn rejects_negative_span_count() {
        let tracker = SiteTracker::new(
            PartitionId::new(0),
            DrId::new(-1),
            uid(0),
            uid(0),
            PartitionId::new(1),
        );
        let mut bytes = tracker.to_bytes().to_vec();
        let count_at = SITE_HEADER_BYTES + 24;
        bytes[count_at..count_at + 4].copy_from_slice(&(-1i32).to_be_bytes());
        let err = SiteTracker::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::NegativeSpanCount(-1)));
    }

    #[test]
    fn rejects_overlapping_spans() {
        // hand-build a receiver body whose spans go backwards
        let mut bytes = BytesMut::new();
        bytes.put_u8(2);
        bytes.put_i32(1); // producer partition id
        bytes.put_i64(-1); // safe point
        bytes.put_i64(0); // last sp unique id
        bytes.put_i64(0); // last mp unique id
        bytes.put_i32(2); // span count
        bytes.put_i64(10);
        bytes.put_i64(20);
        bytes.put_i64(15); // overlaps the previous span
        bytes.put_i64(25);
        let err = BufferReceiverTracker::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::InvalidSpans(_)));
    }

    #[test]
    fn rejects_inverted_span() {
        let mut bytes = BytesMut::new();
        bytes.put_u8(2);
        bytes.put_i32(1);
        bytes.put_i64(-1);
        bytes.put_i64(0);
        bytes.put_i64(0);
        bytes.put_i32(1);
        bytes.put_i64(20);
        bytes.put_i64(10);
        let err = BufferReceiverTracker::deserialize(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidSpans(LedgerError::InvertedSpan { .. })
        ));
    }
}
