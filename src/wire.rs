use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

pub const OP_INSERT: &str = "insert";
pub const OP_SELECT: &str = "select";
pub const OP_UPDATE: &str = "update";
pub const OP_MUTATE: &str = "mutate";
pub const OP_DELETE: &str = "delete";
pub const OP_WAIT: &str = "wait";
pub const OP_COMMIT: &str = "commit";
pub const OP_ABORT: &str = "abort";
pub const OP_COMMENT: &str = "comment";
pub const OP_ASSERT: &str = "assert";

/// Decoded `transact` request: one named database, an ordered operation
/// list. The JSON-RPC framing is handled upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactRequest {
    pub db_name: String,
    pub operations: Vec<Operation>,
}

/// One operation of a `transact` batch. Fields beyond `op` are per-kind;
/// names follow the OVSDB wire protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Operation {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<Map<String, Json>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Map<String, Json>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Vec<Json>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutations: Option<Vec<Json>>,
    #[serde(default, rename = "uuid-name", skip_serializing_if = "Option::is_none")]
    pub uuid_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Per-operation result. Which fields are populated depends on the kind;
/// an empty result serializes as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Map<String, Json>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn init_uuid(&mut self, uuid: Uuid) {
        self.uuid = Some(serde_json::json!(["uuid", uuid.to_string()]));
    }

    pub fn init_rows(&mut self) {
        self.rows = Some(Vec::new());
    }

    pub fn append_row(&mut self, row: Map<String, Json>) {
        self.rows.get_or_insert_with(Vec::new).push(row);
    }

    pub fn init_count(&mut self) {
        self.count = Some(0);
    }

    pub fn increment_count(&mut self) {
        *self.count.get_or_insert(0) += 1;
    }

    pub fn set_error(&mut self, error: &str) {
        self.error = Some(error.to_string());
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactResponse {
    pub result: Vec<OperationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{Operation, OperationResult, TransactRequest};

    #[test]
    fn operation_decodes_ovsdb_field_names() {
        let raw = serde_json::json!({
            "db_name": "simple",
            "operations": [
                {
                    "op": "insert",
                    "table": "table1",
                    "row": {"key1": "val1"},
                    "uuid-name": "row_a"
                },
                {
                    "op": "select",
                    "table": "table1",
                    "where": [["key1", "==", "val1"]]
                }
            ]
        });
        let req: TransactRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.operations.len(), 2);
        assert_eq!(req.operations[0].uuid_name.as_deref(), Some("row_a"));
        assert_eq!(
            req.operations[1].where_clause.as_ref().map(|w| w.len()),
            Some(1)
        );
    }

    #[test]
    fn empty_result_serializes_as_empty_object() {
        let result = OperationResult::default();
        assert_eq!(serde_json::to_string(&result).unwrap(), "{}");
    }

    #[test]
    fn unknown_operation_fields_are_rejected_by_count() {
        let op: Operation = serde_json::from_value(serde_json::json!({"op": "abort"})).unwrap();
        assert!(op.table.is_none());
        assert!(op.durable.is_none());
    }
}
