//! DrId reception bookkeeping for cross-datacenter replication consumers.
//!
//! Module hierarchy follows type dependency order:
//! - identity: DrId, UniqueId, PartitionId, ClusterId atoms
//! - ledger: RangeLedger (pending spans + safe point)
//! - tracker: SiteTracker, BufferReceiverTracker, cross-context merge
//! - codec: binary wire/snapshot form
//! - digest: structured document form
//! - session: per-session tracker registry

#![forbid(unsafe_code)]

pub mod codec;
pub mod digest;
pub mod identity;
pub mod ledger;
pub mod session;
pub mod tracker;

pub use codec::CodecError;
pub use digest::{DigestError, SpanDoc, TrackerDoc, TrackerMap, from_document, to_document};
pub use identity::{ClusterId, DrId, PartitionId, UniqueId};
pub use ledger::{LedgerError, RangeLedger, Span, TxnMarkers};
pub use session::{ConsumerSession, SessionError};
pub use tracker::{BufferReceiverTracker, SiteTracker, TrackerView};
