use crate::kv::{
    KvBackend, KvCompare, KvError, KvOp, KvOpResponse, KvPair, KvTxnRequest, KvTxnResponse,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Reference backend: a sorted in-process map with a revision counter.
/// Provides the full contract (compares, range-gets, atomic batches, op
/// cap); backs the integration tests and demos.
#[derive(Debug)]
pub struct MemBackend {
    state: Mutex<MemState>,
    max_txn_ops: usize,
}

#[derive(Debug, Default)]
struct MemState {
    data: BTreeMap<String, Vec<u8>>,
    revision: i64,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::with_max_ops(128)
    }

    pub fn with_max_ops(max_txn_ops: usize) -> Self {
        Self {
            state: Mutex::new(MemState::default()),
            max_txn_ops,
        }
    }

    /// Seeds a key outside any transaction, bumping the revision.
    pub fn seed(&self, key: impl Into<String>, value: Vec<u8>) {
        let mut state = self.state.lock();
        state.data.insert(key.into(), value);
        state.revision += 1;
    }

    /// Snapshot of the full store, for assertions in tests.
    pub fn dump(&self) -> BTreeMap<String, Vec<u8>> {
        self.state.lock().data.clone()
    }

    pub fn revision(&self) -> i64 {
        self.state.lock().revision
    }

    fn range(state: &MemState, prefix: &str) -> Vec<KvPair> {
        state
            .data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvPair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for MemBackend {
    async fn commit(&self, txn: KvTxnRequest) -> Result<KvTxnResponse, KvError> {
        let mut state = self.state.lock();
        if txn.then_ops.len() > self.max_txn_ops || txn.else_ops.len() > self.max_txn_ops {
            return Err(KvError::TooManyOps {
                count: txn.then_ops.len().max(txn.else_ops.len()),
                max: self.max_txn_ops,
            });
        }

        let succeeded = txn.compares.iter().all(|cmp| match cmp {
            KvCompare::ValueEquals { key, expected } => {
                state.data.get(key).map(|v| v == expected).unwrap_or(false)
            }
        });
        let ops = if succeeded { &txn.then_ops } else { &txn.else_ops };

        let mut mutated = false;
        let mut responses = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                KvOp::RangeGet { prefix } => {
                    responses.push(KvOpResponse::Range {
                        pairs: Self::range(&state, prefix),
                    });
                }
                KvOp::Put { key, value } => {
                    state.data.insert(key.clone(), value.clone());
                    mutated = true;
                    responses.push(KvOpResponse::Put);
                }
                KvOp::Delete { key } => {
                    let deleted = state.data.remove(key).map(|_| 1).unwrap_or(0);
                    mutated = deleted > 0 || mutated;
                    responses.push(KvOpResponse::Delete { deleted });
                }
            }
        }
        if mutated {
            state.revision += 1;
        }
        Ok(KvTxnResponse {
            succeeded,
            responses,
            revision: state.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::MemBackend;
    use crate::kv::{KvBackend, KvCompare, KvOp, KvOpResponse, KvTxnRequest};

    #[tokio::test]
    async fn range_get_sees_writes_from_the_same_transaction_order() {
        let backend = MemBackend::new();
        backend.seed("p/a/1", b"one".to_vec());
        backend.seed("p/a/2", b"two".to_vec());
        backend.seed("p/b/1", b"other".to_vec());

        let response = backend
            .commit(KvTxnRequest {
                compares: Vec::new(),
                then_ops: vec![KvOp::RangeGet {
                    prefix: "p/a/".to_string(),
                }],
                else_ops: Vec::new(),
            })
            .await
            .unwrap();
        let KvOpResponse::Range { pairs } = &response.responses[0] else {
            panic!("expected a range response");
        };
        assert_eq!(pairs.len(), 2);
    }

    #[tokio::test]
    async fn failed_compare_runs_else_branch() {
        let backend = MemBackend::new();
        backend.seed("k", b"actual".to_vec());
        let response = backend
            .commit(KvTxnRequest {
                compares: vec![KvCompare::ValueEquals {
                    key: "k".to_string(),
                    expected: b"expected".to_vec(),
                }],
                then_ops: vec![KvOp::Put {
                    key: "k".to_string(),
                    value: b"then".to_vec(),
                }],
                else_ops: Vec::new(),
            })
            .await
            .unwrap();
        assert!(!response.succeeded);
        assert_eq!(backend.dump().get("k").unwrap(), b"actual");
    }

    #[tokio::test]
    async fn oversize_transactions_are_rejected() {
        let backend = MemBackend::with_max_ops(2);
        let ops = (0..3)
            .map(|i| KvOp::Put {
                key: format!("k{i}"),
                value: Vec::new(),
            })
            .collect();
        let err = backend
            .commit(KvTxnRequest {
                compares: Vec::new(),
                then_ops: ops,
                else_ops: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, crate::kv::KvError::TooManyOps { .. }));
    }

    #[tokio::test]
    async fn read_only_transactions_do_not_bump_revision() {
        let backend = MemBackend::new();
        backend.seed("k", b"v".to_vec());
        let before = backend.revision();
        backend
            .commit(KvTxnRequest {
                compares: Vec::new(),
                then_ops: vec![KvOp::RangeGet {
                    prefix: "k".to_string(),
                }],
                else_ops: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(backend.revision(), before);
    }
}
