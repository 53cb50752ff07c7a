/// Runtime configuration for the transaction engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Process-wide key prefix on the backend, e.g. `ovsdb/nb`.
    pub key_prefix: String,
    /// Per-submission op cap enforced by the backend.
    pub max_txn_ops: usize,
    /// Split oversize write batches into multiple backend transactions.
    /// Splitting forfeits atomicity across the split; off by default, in
    /// which case oversize batches surface `resources exhausted`.
    pub split_oversize_batches: bool,
    /// When true, a `wait` op with a non-zero timeout fails `not supported`
    /// instead of being evaluated once against the current snapshot.
    pub wait_honors_timeout: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ovsdb".to_string(),
            max_txn_ops: 128,
            split_oversize_batches: false,
            wait_honors_timeout: false,
        }
    }
}
