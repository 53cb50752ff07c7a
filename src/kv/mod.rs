pub mod buffer;
pub mod key;
pub mod mem;

use async_trait::async_trait;
use thiserror::Error;

/// One operation of a backend transaction's `then`/`else` lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    /// Range read of every key under `prefix`.
    RangeGet { prefix: String },
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl KvOp {
    pub fn key(&self) -> &str {
        match self {
            KvOp::RangeGet { prefix } => prefix,
            KvOp::Put { key, .. } => key,
            KvOp::Delete { key } => key,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, KvOp::RangeGet { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
}

/// Per-op response, aligned with the submitted `then` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOpResponse {
    Range { pairs: Vec<KvPair> },
    Put,
    Delete { deleted: u64 },
}

/// Compare predicate for the `if` list. Currently unused by the engine but
/// kept so the buffer shape matches the backend contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCompare {
    ValueEquals { key: String, expected: Vec<u8> },
}

#[derive(Debug, Clone, Default)]
pub struct KvTxnRequest {
    pub compares: Vec<KvCompare>,
    pub then_ops: Vec<KvOp>,
    pub else_ops: Vec<KvOp>,
}

#[derive(Debug, Clone)]
pub struct KvTxnResponse {
    pub succeeded: bool,
    pub responses: Vec<KvOpResponse>,
    /// Monotonic store revision after this transaction.
    pub revision: i64,
}

#[derive(Debug, Clone, Error)]
pub enum KvError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("transaction of {count} ops exceeds backend limit {max}")]
    TooManyOps { count: usize, max: usize },
}

/// Contract of the external KV store: a single atomic compare-and-swap
/// commit. Range-gets travel inside the same transaction so reads observe
/// one consistent revision.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn commit(&self, txn: KvTxnRequest) -> Result<KvTxnResponse, KvError>;
}
