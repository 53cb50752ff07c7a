use crate::error::OvsdbError;
use crate::kv::{KvBackend, KvCompare, KvError, KvOp, KvTxnRequest, KvTxnResponse};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Net effect of one transaction on one key, consumed by the monitor
/// subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Create {
        key: String,
        value: Vec<u8>,
    },
    Modify {
        key: String,
        value: Vec<u8>,
        prev_value: Vec<u8>,
    },
    Delete {
        key: String,
        prev_value: Vec<u8>,
    },
}

impl ChangeEvent {
    pub fn key(&self) -> &str {
        match self {
            ChangeEvent::Create { key, .. }
            | ChangeEvent::Modify { key, .. }
            | ChangeEvent::Delete { key, .. } => key,
        }
    }

    fn is_create(&self) -> bool {
        matches!(self, ChangeEvent::Create { .. })
    }
}

/// Accumulates one backend transaction: compare predicates, fetch ops,
/// write ops, and per-write change events. Writes and events are strictly
/// index-aligned; a `None` event slot is a nil placeholder for writes with
/// no observable change (comments), tracked by an explicit counter.
#[derive(Debug, Default)]
pub struct TxnBuffer {
    compares: Vec<KvCompare>,
    fetches: Vec<KvOp>,
    writes: Vec<KvOp>,
    events: Vec<Option<ChangeEvent>>,
    nil_event_count: usize,
    response: Option<KvTxnResponse>,
}

impl TxnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.compares.clear();
        self.fetches.clear();
        self.writes.clear();
        self.events.clear();
        self.nil_event_count = 0;
        self.response = None;
        self.assert_paired();
    }

    /// Panics on a pairing violation: a violation is a handler bug, never a
    /// client error.
    pub fn assert_paired(&self) {
        let observable = self.events.iter().filter(|e| e.is_some()).count();
        assert_eq!(
            self.writes.len(),
            observable + self.nil_event_count,
            "write/event pairing violated: {} writes, {} events, {} nil",
            self.writes.len(),
            observable,
            self.nil_event_count,
        );
        assert_eq!(self.writes.len(), self.events.len());
    }

    pub fn enqueue_range_get(&mut self, prefix: String) {
        debug!(prefix = %prefix, "enqueue range-get");
        self.fetches.push(KvOp::RangeGet { prefix });
    }

    pub fn put(&mut self, key: String, value: Vec<u8>, event: ChangeEvent) {
        debug!(key = %key, "enqueue put");
        self.writes.push(KvOp::Put { key, value });
        self.events.push(Some(event));
        self.assert_paired();
    }

    /// A write with no observable change event; pairs via a nil slot.
    pub fn put_unobserved(&mut self, key: String, value: Vec<u8>) {
        debug!(key = %key, "enqueue unobserved put");
        self.writes.push(KvOp::Put { key, value });
        self.events.push(None);
        self.nil_event_count += 1;
        self.assert_paired();
    }

    pub fn delete(&mut self, key: String, event: ChangeEvent) {
        debug!(key = %key, "enqueue delete");
        self.writes.push(KvOp::Delete { key });
        self.events.push(Some(event));
        self.assert_paired();
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.len()
    }

    /// Events surviving compaction, in write order. Nil slots are excluded.
    pub fn events(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter().flatten()
    }

    pub fn response(&self) -> Option<&KvTxnResponse> {
        self.response.as_ref()
    }

    /// Compacts the write/event streams so the batch reflects net effect:
    /// among writes to one key only the last survives, and a surviving
    /// modify whose key was created earlier in this transaction is rewritten
    /// to a create carrying the final value.
    pub fn compact(&mut self) {
        let mut last_index: HashMap<&str, usize> = HashMap::new();
        for (i, write) in self.writes.iter().enumerate() {
            last_index.insert(write.key(), i);
        }
        let keep: Vec<bool> = self
            .writes
            .iter()
            .enumerate()
            .map(|(i, w)| last_index[w.key()] == i)
            .collect();

        let mut born_keys: HashSet<String> = HashSet::new();
        for (i, event) in self.events.iter().enumerate() {
            if !keep[i] {
                if let Some(ev) = event {
                    if ev.is_create() {
                        born_keys.insert(ev.key().to_string());
                    }
                }
            }
        }

        let writes = std::mem::take(&mut self.writes);
        let events = std::mem::take(&mut self.events);
        for (i, (write, event)) in writes.into_iter().zip(events).enumerate() {
            if !keep[i] {
                if event.is_none() {
                    self.nil_event_count -= 1;
                }
                debug!(key = %write.key(), index = i, "compacted duplicate write");
                continue;
            }
            let event = match event {
                Some(ChangeEvent::Modify { key, value, .. }) if born_keys.contains(&key) => {
                    Some(ChangeEvent::Create { key, value })
                }
                other => other,
            };
            self.writes.push(write);
            self.events.push(event);
        }
        self.assert_paired();
    }

    /// Submits the buffered ops as one atomic backend transaction. With
    /// splitting enabled an oversize write batch is chunked, forfeiting
    /// atomicity across chunks; otherwise the backend's rejection surfaces
    /// as `resources exhausted`.
    pub async fn submit(
        &mut self,
        backend: &dyn KvBackend,
        max_txn_ops: usize,
        split_oversize: bool,
    ) -> Result<&KvTxnResponse, OvsdbError> {
        let total = self.fetches.len() + self.writes.len();
        let mut requests = Vec::new();
        if split_oversize && total > max_txn_ops {
            let mut ops: Vec<KvOp> = self.fetches.iter().chain(self.writes.iter()).cloned().collect();
            while !ops.is_empty() {
                let rest = ops.split_off(ops.len().min(max_txn_ops));
                requests.push(KvTxnRequest {
                    compares: Vec::new(),
                    then_ops: ops,
                    else_ops: Vec::new(),
                });
                ops = rest;
            }
        } else {
            requests.push(KvTxnRequest {
                compares: self.compares.clone(),
                then_ops: self.fetches.iter().chain(self.writes.iter()).cloned().collect(),
                else_ops: Vec::new(),
            });
        }

        let mut merged: Option<KvTxnResponse> = None;
        for request in requests {
            let response = backend.commit(request).await.map_err(|err| match err {
                KvError::TooManyOps { count, max } => {
                    warn!(count, max, "backend rejected oversize transaction");
                    OvsdbError::ResourcesExhausted
                }
                other => {
                    warn!(error = %other, "backend commit failed");
                    OvsdbError::Io
                }
            })?;
            merged = Some(match merged {
                None => response,
                Some(mut acc) => {
                    acc.responses.extend(response.responses);
                    acc.revision = response.revision;
                    acc.succeeded = acc.succeeded && response.succeeded;
                    acc
                }
            });
        }
        self.response = merged;
        Ok(self.response.as_ref().expect("at least one submission"))
    }
}
