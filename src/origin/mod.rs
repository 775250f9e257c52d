//! Origin service integration
//!
//! The origin service is an external, untrusted, rate-limited backend that
//! resolves a public media URL into an encrypted info payload and, given a
//! resolution key, into download candidates. This module covers endpoint
//! selection, info fetching, payload decryption, and candidate probing.

pub mod client;
pub mod decoder;

pub use client::{candidate_order, DownloadCandidate, OriginApi, OriginClient, OriginConfig};
pub use decoder::{decode_payload, DecodedInfo};

#[cfg(test)]
pub(crate) use decoder::encrypt_fixture;
