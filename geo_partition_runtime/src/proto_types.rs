//! Hand-written protobuf types for the store file.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//!
//! File layout, one length-prefixed frame each:
//!   header   ProtoStoreHeader
//!   record   ProtoDistributionRecord   (header.distribution_count times)
//!   trailer  ProtoStoreTrailer         (SHA-256 of every preceding frame)

use prost::Message;

pub const STORE_FORMAT_VERSION: u32 = 1;

// ── Framing ────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoStoreHeader {
    #[prost(uint32, tag = "1")]
    pub format_version: u32,
    #[prost(uint64, tag = "2")]
    pub next_distribution_id: u64,
    #[prost(uint64, tag = "3")]
    pub distribution_count: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoStoreTrailer {
    #[prost(bytes = "vec", tag = "1")]
    pub sha256: Vec<u8>,
}

// ── Distribution ───────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoFilterSnapshot {
    #[prost(string, repeated, tag = "1")]
    pub categories: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub regions: Vec<String>,
    #[prost(string, repeated, tag = "3")]
    pub localities: Vec<String>,
    #[prost(string, repeated, tag = "4")]
    pub tags: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoPartnerCount {
    #[prost(uint32, tag = "1")]
    pub partner_index: u32,
    #[prost(uint64, tag = "2")]
    pub count: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoTimestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(uint32, tag = "2")]
    pub nanos: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoDistribution {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, optional, tag = "3")]
    pub filter: Option<ProtoFilterSnapshot>,
    #[prost(double, tag = "4")]
    pub threshold_meters: f64,
    #[prost(string, repeated, tag = "5")]
    pub partner_names: Vec<String>,
    #[prost(message, repeated, tag = "6")]
    pub partner_counts: Vec<ProtoPartnerCount>,
    #[prost(uint64, tag = "7")]
    pub total: u64,
    #[prost(bool, tag = "8")]
    pub active: bool,
    #[prost(message, optional, tag = "9")]
    pub created_at: Option<ProtoTimestamp>,
}

// ── Assignment ─────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoAssignment {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub structure_id: u64,
    #[prost(uint32, tag = "3")]
    pub partner_index: u32,
    #[prost(bool, tag = "4")]
    pub random: bool,
}

/// A header with its rows. Rows carry no distribution id on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct ProtoDistributionRecord {
    #[prost(message, optional, tag = "1")]
    pub distribution: Option<ProtoDistribution>,
    #[prost(message, repeated, tag = "2")]
    pub assignments: Vec<ProtoAssignment>,
}
