//! Wire types and constants for the skylift upload protocol.
//!
//! The protocol has two halves: a one-shot JSON negotiation that yields an
//! upload destination, and a chunked byte-transfer protocol against that
//! destination (PATCH with offset headers, HEAD to probe durable state).
//! This crate holds the serializable contract for both; the client logic
//! lives in `skylift-uploader`.

pub mod constants;
pub mod negotiate;
pub mod types;
