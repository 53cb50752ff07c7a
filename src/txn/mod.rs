pub mod cache;
pub mod condition;
pub mod mutation;
pub mod named_uuid;
pub mod ops;

use crate::config::EngineConfig;
use crate::error::OvsdbError;
use crate::kv::buffer::TxnBuffer;
use crate::kv::key::KeyCodec;
use crate::kv::KvBackend;
use crate::schema::SchemaRegistry;
use crate::txn::cache::Cache;
use crate::txn::named_uuid::NamedUuidMap;
use crate::txn::ops::OpKind;
use crate::wire::{OperationResult, TransactRequest, TransactResponse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Transaction-local state threaded through the op handlers. The cache,
/// named-UUID map, and buffer never escape one transaction.
pub(crate) struct TxnState<'a> {
    pub db_name: String,
    pub config: &'a EngineConfig,
    pub codec: &'a KeyCodec,
    pub schemas: &'a SchemaRegistry,
    pub cache: Cache,
    pub named: NamedUuidMap,
    pub buffer: TxnBuffer,
}

/// Per-database mutual exclusion. Entries are created lazily; the registry
/// itself is guarded by a coarse lock, and each database lock is held for a
/// whole transaction including its backend round-trips.
#[derive(Default)]
struct LockRegistry {
    databases: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockRegistry {
    fn database(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut databases = self.databases.lock();
        databases.entry(name.to_string()).or_default().clone()
    }
}

#[derive(Debug, Clone)]
pub struct TransactOutcome {
    pub response: TransactResponse,
    /// Backend commit revision, or −1 when the transaction failed.
    pub revision: i64,
}

/// The two-phase transaction executor. Holds the shared schema registry and
/// backend client; everything per-transaction lives in `TxnState`.
pub struct TransactionEngine {
    backend: Arc<dyn KvBackend>,
    schemas: Arc<SchemaRegistry>,
    config: EngineConfig,
    codec: KeyCodec,
    locks: LockRegistry,
}

impl TransactionEngine {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        schemas: Arc<SchemaRegistry>,
        config: EngineConfig,
    ) -> Self {
        let codec = KeyCodec::new(config.key_prefix.clone());
        Self {
            backend,
            schemas,
            config,
            codec,
            locks: LockRegistry::default(),
        }
    }

    /// Executes one `transact` batch. Transactions on the same database are
    /// serialized by the lock acquired here; dropping the returned future
    /// cancels the transaction with no partial commit.
    pub async fn transact(&self, request: TransactRequest) -> TransactOutcome {
        debug!(db = %request.db_name, ops = request.operations.len(), "transaction begin");
        let lock = self.locks.database(&request.db_name);
        let _guard = lock.lock().await;
        self.run_locked(request).await
    }

    async fn run_locked(&self, request: TransactRequest) -> TransactOutcome {
        let mut response = TransactResponse {
            result: vec![OperationResult::default(); request.operations.len()],
            error: None,
        };

        let mut kinds = Vec::with_capacity(request.operations.len());
        for (index, op) in request.operations.iter().enumerate() {
            match OpKind::parse(&op.op) {
                Some(kind) => kinds.push(kind),
                None => {
                    warn!(op = %op.op, index, "unknown operation");
                    let message = OvsdbError::Syntax.to_string();
                    response.result[index].set_error(&message);
                    response.error = Some(message);
                    return TransactOutcome {
                        response,
                        revision: -1,
                    };
                }
            }
        }

        // select must not be mixed with mutating operations
        let has_select = kinds.iter().any(|k| *k == OpKind::Select);
        let has_other = kinds.iter().any(|k| *k != OpKind::Select);
        if has_select && has_other {
            warn!("select cannot be mixed with other operations");
            response.error = Some(OvsdbError::ConstraintViolation.to_string());
            return TransactOutcome {
                response,
                revision: -1,
            };
        }

        let mut state = TxnState {
            db_name: request.db_name.clone(),
            config: &self.config,
            codec: &self.codec,
            schemas: &self.schemas,
            cache: Cache::new(),
            named: NamedUuidMap::default(),
            buffer: TxnBuffer::new(),
        };

        // fetch pass: populate the read set, one backend round-trip
        state.buffer.clear();
        for (index, op) in request.operations.iter().enumerate() {
            let (pre, _) = ops::handlers(kinds[index]);
            if let Err(err) = pre(&mut state, op, &mut response.result[index]) {
                let message = err.to_string();
                response.result[index].set_error(&message);
                response.error = Some(message);
                return TransactOutcome {
                    response,
                    revision: -1,
                };
            }
        }
        if let Err(err) = self.round_trip(&mut state).await {
            response.error = Some(err.to_string());
            return TransactOutcome {
                response,
                revision: -1,
            };
        }

        // mutate pass: run against the populated cache, then submit the net
        // write batch
        state.buffer.clear();
        for (index, op) in request.operations.iter().enumerate() {
            let (_, do_phase) = ops::handlers(kinds[index]);
            if let Err(err) = do_phase(&mut state, op, &mut response.result[index]) {
                let message = err.to_string();
                response.result[index].set_error(&message);
                response.error = Some(message);
                return TransactOutcome {
                    response,
                    revision: -1,
                };
            }
            if let Err(err) = state.cache.validate(state.schemas) {
                panic!("cache validation failed after {} op: {err}", op.op);
            }
        }

        state.buffer.compact();
        match self.round_trip(&mut state).await {
            Ok(revision) => {
                debug!(db = %request.db_name, revision, "transaction committed");
                TransactOutcome { response, revision }
            }
            Err(err) => {
                response.error = Some(err.to_string());
                TransactOutcome {
                    response,
                    revision: -1,
                }
            }
        }
    }

    /// Submits the buffered ops and folds the response into the cache. Any
    /// post-load schema failure means backend/schema drift.
    async fn round_trip(&self, state: &mut TxnState<'_>) -> Result<i64, OvsdbError> {
        let response = state
            .buffer
            .submit(
                self.backend.as_ref(),
                self.config.max_txn_ops,
                self.config.split_oversize_batches,
            )
            .await?;
        let revision = response.revision;
        state.cache.ingest(&self.codec, response)?;
        state.cache.unmarshal(&self.schemas)?;
        state.cache.validate(&self.schemas)?;
        Ok(revision)
    }
}
