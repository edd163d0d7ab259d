//! Pluggable control-plane dispatcher (spec §1 item 7), generalized from
//! `rpc::ServicesManager`'s reflection-based service table
//! (`whisperlib/net/rpc/lib/server/rpc_services_manager.h`) to a single
//! `call` entry point: this crate has no generated RPC stubs, so the
//! service/method lookup is the embedder's to implement.

use super::query::{Query, QueryResult};

/// Executes one [`Query`] to completion, called from a worker thread (spec
/// §4.10/§5: `std::thread` + condvar pool, not `tokio`). Implementations
/// that need async I/O should block on their own runtime handle or use a
/// blocking client, matching the original's "service implementation may
/// delay execution on a separate thread of its own" note.
pub trait ServicesManager: Send + Sync {
    fn call(&self, query: &Query) -> QueryResult;
}

/// A `ServicesManager` that rejects every call, useful as a default before
/// an embedder wires up real services or in tests exercising only pool
/// mechanics.
pub struct UnimplementedServices;

impl ServicesManager for UnimplementedServices {
    fn call(&self, query: &Query) -> QueryResult {
        QueryResult {
            id: query.id,
            transport_id: query.transport_id,
            result_handler_id: query.result_handler_id,
            codec: query.codec,
            body: Err(format!("no service registered for {}.{}", query.service, query.method)),
        }
    }
}
