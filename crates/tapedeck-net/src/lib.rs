#![forbid(unsafe_code)]

//! `tapedeck-net`
//!
//! The network side of ingestion: an object-safe [`Net`] trait producing
//! ordered byte streams, and a reqwest-backed [`HttpClient`].
//!
//! Nothing here retries or times out a body stream. Stalls are observed by the
//! session as buffering state, and retry is a caller decision.

mod client;
mod error;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    traits::{ByteResponse, ByteStream, Net},
    types::{Headers, NetOptions, RangeSpec, parse_content_range_total},
};
