//! Control-plane query/result shapes (spec §4.10, §6.5), grounded on
//! `rpc::Query`/`rpc::Response` (`whisperlib/net/rpc/lib/types/rpc_message.cc`),
//! generalized from that crate's xid/reflection-based method dispatch to a
//! plain `service`/`method` string pair plus an opaque `Bytes` body, since
//! this crate has no code-generated RPC stub layer to target.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

/// Wire encoding of a query/result body (spec §4.10: "JSON or binary
/// bodies").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json,
    Binary,
}

/// Identifies one query without pointer aliasing, same shape as
/// [`crate::element::RequestId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(u64);

impl QueryId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

pub struct QueryIdAllocator;

impl QueryIdAllocator {
    pub fn next() -> QueryId {
        QueryId(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One control-plane call queued for a worker (`rpc::Query` generalized:
/// `service`/`method` replace the original's per-service vtable index,
/// `result_handler_id` replaces the completion-callback pointer so the
/// pool never holds a callback into caller state — see DESIGN.md).
#[derive(Debug, Clone)]
pub struct Query {
    pub id: QueryId,
    /// Opaque identifier for the transport (connection/session) the query
    /// arrived on, so the result can be routed back without the pool
    /// knowing anything about RTMP/RTSP/RPC transport specifics.
    pub transport_id: u64,
    pub service: String,
    pub method: String,
    pub body: Bytes,
    pub codec: Codec,
    pub result_handler_id: u64,
}

impl Query {
    pub fn new(
        transport_id: u64,
        service: impl Into<String>,
        method: impl Into<String>,
        body: Bytes,
        codec: Codec,
        result_handler_id: u64,
    ) -> Self {
        Self {
            id: QueryIdAllocator::next(),
            transport_id,
            service: service.into(),
            method: method.into(),
            body,
            codec,
            result_handler_id,
        }
    }
}

/// Outcome of executing a [`Query`], handed back to whatever registered
/// `result_handler_id` (spec §4.10 "result-handler-by-id").
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub id: QueryId,
    pub transport_id: u64,
    pub result_handler_id: u64,
    pub codec: Codec,
    pub body: std::result::Result<Bytes, String>,
}
