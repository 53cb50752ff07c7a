use crate::error::OvsdbError;
use crate::kv::buffer::ChangeEvent;
use crate::kv::key::{rfc3339_now, DataKey};
use crate::row::{self, Row};
use crate::schema::TableSchema;
use crate::txn::condition::{row_matches_where, where_uuid_fast_path};
use crate::txn::{mutation, TxnState};
use crate::value::{unmarshal_uuid, Atom};
use crate::wire::{self, Operation, OperationResult};
use serde_json::Value as Json;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Select,
    Update,
    Mutate,
    Delete,
    Wait,
    Commit,
    Abort,
    Comment,
    Assert,
}

impl OpKind {
    pub fn parse(op: &str) -> Option<OpKind> {
        match op {
            wire::OP_INSERT => Some(OpKind::Insert),
            wire::OP_SELECT => Some(OpKind::Select),
            wire::OP_UPDATE => Some(OpKind::Update),
            wire::OP_MUTATE => Some(OpKind::Mutate),
            wire::OP_DELETE => Some(OpKind::Delete),
            wire::OP_WAIT => Some(OpKind::Wait),
            wire::OP_COMMIT => Some(OpKind::Commit),
            wire::OP_ABORT => Some(OpKind::Abort),
            wire::OP_COMMENT => Some(OpKind::Comment),
            wire::OP_ASSERT => Some(OpKind::Assert),
            _ => None,
        }
    }
}

pub(crate) type Handler =
    fn(&mut TxnState<'_>, &Operation, &mut OperationResult) -> Result<(), OvsdbError>;

/// The two-phase dispatch table: one `(pre, do)` pair per operation kind.
pub(crate) fn handlers(kind: OpKind) -> (Handler, Handler) {
    match kind {
        OpKind::Insert => (pre_insert, do_insert),
        OpKind::Select => (pre_fetch_by_where, do_select),
        OpKind::Update => (pre_fetch_by_where, do_update),
        OpKind::Mutate => (pre_fetch_by_where, do_mutate),
        OpKind::Delete => (pre_fetch_by_where, do_delete),
        OpKind::Wait => (pre_wait, do_wait),
        OpKind::Commit => (pre_commit, do_noop),
        OpKind::Abort => (pre_abort, do_noop),
        OpKind::Comment => (pre_noop, do_comment),
        OpKind::Assert => (pre_noop, do_noop),
    }
}

fn required_table<'o>(op: &'o Operation) -> Result<&'o str, OvsdbError> {
    op.table.as_deref().ok_or_else(|| {
        warn!(op = %op.op, "missing table parameter");
        OvsdbError::ConstraintViolation
    })
}

fn concrete_uuid(raw: &Json) -> Result<Uuid, OvsdbError> {
    match unmarshal_uuid(raw)? {
        Atom::Uuid(uuid) => Ok(uuid),
        _ => {
            warn!("expected a concrete uuid");
            Err(OvsdbError::ConstraintViolation)
        }
    }
}

/// Rows of the cached table selected by the op's `where` clause, snapshotted
/// so handlers can mutate the cache while iterating.
fn matching_rows(
    state: &TxnState<'_>,
    table_name: &str,
    table: &TableSchema,
    where_clause: Option<&[Json]>,
) -> Result<Vec<(String, Row)>, OvsdbError> {
    let mut selected = Vec::new();
    if let Some(rows) = state.cache.table(&state.db_name, table_name) {
        for (uuid, row) in rows {
            if row_matches_where(table, &state.named, row, where_clause)? {
                selected.push((uuid.clone(), row.clone()));
            }
        }
    }
    Ok(selected)
}

/// Shared pre-phase for select/update/mutate/delete (and wait): a narrow
/// range-get when the `where` clause pins `_uuid`, a table-wide one
/// otherwise.
fn pre_fetch_by_where(
    state: &mut TxnState<'_>,
    op: &Operation,
    _result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    let schemas = state.schemas;
    let table_name = required_table(op)?;
    let table = schemas.table(&state.db_name, table_name)?;
    let prefix = match where_uuid_fast_path(table, &state.named, op.where_clause.as_deref())? {
        Some(uuid) => state
            .codec
            .data_key(&state.db_name, table_name, &uuid.to_string()),
        None => state.codec.table_prefix(&state.db_name, table_name),
    };
    state.buffer.enqueue_range_get(prefix);
    Ok(())
}

fn pre_insert(
    state: &mut TxnState<'_>,
    op: &Operation,
    _result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    let table_name = required_table(op)?;
    if let Some(name) = &op.uuid_name {
        let uuid = match &op.uuid {
            Some(raw) => concrete_uuid(raw)?,
            None => Uuid::new_v4(),
        };
        state.named.reserve(name, uuid)?;
    }
    let prefix = state.codec.table_prefix(&state.db_name, table_name);
    state.buffer.enqueue_range_get(prefix);
    Ok(())
}

fn do_insert(
    state: &mut TxnState<'_>,
    op: &Operation,
    result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    let schemas = state.schemas;
    let table_name = required_table(op)?;
    let table = schemas.table(&state.db_name, table_name)?;

    let uuid = if let Some(name) = &op.uuid_name {
        state.named.get(name)?
    } else if let Some(raw) = &op.uuid {
        concrete_uuid(raw)?
    } else {
        Uuid::new_v4()
    };

    if let Some(rows) = state.cache.table(&state.db_name, table_name) {
        if rows.contains_key(&uuid.to_string()) {
            warn!(uuid = %uuid, table = table_name, "duplicate uuid");
            return Err(OvsdbError::DuplicateUuid);
        }
    }
    result.init_uuid(uuid);

    let mut new_row = match &op.row {
        Some(map) => Row::from_wire(map).map_err(|err| {
            warn!(error = %err, "insert row failed to parse");
            OvsdbError::ConstraintViolation
        })?,
        None => Row::new(),
    };
    table.default_row(&mut new_row);
    new_row.set_uuid(uuid);
    row::prepare(table, &state.named, &mut new_row)?;

    let key = DataKey {
        database: state.db_name.clone(),
        table: table_name.to_string(),
        uuid: uuid.to_string(),
    };
    let flat = state.codec.data_key(&key.database, &key.table, &key.uuid);
    let value = new_row.to_wire_bytes();
    state.cache.set_row(&key, new_row);
    state.buffer.put(
        flat.clone(),
        value.clone(),
        ChangeEvent::Create { key: flat, value },
    );
    Ok(())
}

fn do_select(
    state: &mut TxnState<'_>,
    op: &Operation,
    result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    result.init_rows();
    let schemas = state.schemas;
    let table_name = required_table(op)?;
    let table = schemas.table(&state.db_name, table_name)?;
    let Some(rows) = state.cache.table(&state.db_name, table_name) else {
        return Ok(());
    };
    for row in rows.values() {
        if !row_matches_where(table, &state.named, row, op.where_clause.as_deref())? {
            continue;
        }
        let projected = row::project(row, op.columns.as_deref());
        result.append_row(projected.to_wire());
    }
    Ok(())
}

fn do_update(
    state: &mut TxnState<'_>,
    op: &Operation,
    result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    result.init_count();
    let schemas = state.schemas;
    let table_name = required_table(op)?;
    let table = schemas.table(&state.db_name, table_name)?;
    let update_wire = op.row.as_ref().ok_or_else(|| {
        warn!("missing row parameter");
        OvsdbError::ConstraintViolation
    })?;

    for (uuid, mut current) in matching_rows(state, table_name, table, op.where_clause.as_deref())?
    {
        let mut updates = Row::from_wire(update_wire).map_err(|err| {
            warn!(error = %err, "update row failed to parse");
            OvsdbError::ConstraintViolation
        })?;
        row::prepare(table, &state.named, &mut updates)?;

        let prev_value = current.to_wire_bytes();
        row::update(table, &mut current, &updates)?;

        let key = DataKey {
            database: state.db_name.clone(),
            table: table_name.to_string(),
            uuid: uuid.clone(),
        };
        let flat = state.codec.data_key(&key.database, &key.table, &key.uuid);
        let value = current.to_wire_bytes();
        state.cache.set_row(&key, current);
        state.buffer.put(
            flat.clone(),
            value.clone(),
            ChangeEvent::Modify {
                key: flat,
                value,
                prev_value,
            },
        );
        result.increment_count();
    }
    Ok(())
}

fn do_mutate(
    state: &mut TxnState<'_>,
    op: &Operation,
    result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    result.init_count();
    let schemas = state.schemas;
    let table_name = required_table(op)?;
    let table = schemas.table(&state.db_name, table_name)?;
    let mutations = op.mutations.as_deref().ok_or_else(|| {
        warn!("missing mutations parameter");
        OvsdbError::ConstraintViolation
    })?;

    for (uuid, mut current) in matching_rows(state, table_name, table, op.where_clause.as_deref())?
    {
        let prev_value = current.to_wire_bytes();
        mutation::apply_all(table, &state.named, &mut current, mutations)?;

        let key = DataKey {
            database: state.db_name.clone(),
            table: table_name.to_string(),
            uuid: uuid.clone(),
        };
        let flat = state.codec.data_key(&key.database, &key.table, &key.uuid);
        let value = current.to_wire_bytes();
        state.cache.set_row(&key, current);
        state.buffer.put(
            flat.clone(),
            value.clone(),
            ChangeEvent::Modify {
                key: flat,
                value,
                prev_value,
            },
        );
        result.increment_count();
    }
    Ok(())
}

fn do_delete(
    state: &mut TxnState<'_>,
    op: &Operation,
    result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    result.init_count();
    let schemas = state.schemas;
    let table_name = required_table(op)?;
    let table = schemas.table(&state.db_name, table_name)?;

    for (uuid, row) in matching_rows(state, table_name, table, op.where_clause.as_deref())? {
        let flat = state.codec.data_key(&state.db_name, table_name, &uuid);
        state.buffer.delete(
            flat.clone(),
            ChangeEvent::Delete {
                key: flat,
                prev_value: row.to_wire_bytes(),
            },
        );
        result.increment_count();
    }
    Ok(())
}

fn pre_wait(
    state: &mut TxnState<'_>,
    op: &Operation,
    result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    let Some(timeout) = op.timeout else {
        warn!("missing timeout parameter");
        return Err(OvsdbError::ConstraintViolation);
    };
    if timeout != 0 {
        if state.config.wait_honors_timeout {
            warn!(timeout, "blocking wait is not supported");
            return Err(OvsdbError::NotSupported);
        }
        debug!(timeout, "ignoring non-zero wait timeout");
    }
    pre_fetch_by_where(state, op, result)
}

fn do_wait(
    state: &mut TxnState<'_>,
    op: &Operation,
    _result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    let schemas = state.schemas;
    let table_name = required_table(op)?;
    let expected_wire = op.rows.as_ref().ok_or_else(|| {
        warn!("missing rows parameter");
        OvsdbError::ConstraintViolation
    })?;
    if expected_wire.is_empty() {
        return Ok(());
    }
    let equal = match op.until.as_deref() {
        Some("==") => true,
        Some("!=") => false,
        Some(other) => {
            warn!(until = other, "unsupported wait function");
            return Err(OvsdbError::ConstraintViolation);
        }
        None => {
            warn!("missing until parameter");
            return Err(OvsdbError::ConstraintViolation);
        }
    };
    let table = schemas.table(&state.db_name, table_name)?;

    let mut expected_rows = Vec::with_capacity(expected_wire.len());
    for map in expected_wire {
        let mut expected = Row::from_wire(map).map_err(|err| {
            warn!(error = %err, "wait row failed to parse");
            OvsdbError::ConstraintViolation
        })?;
        row::prepare(table, &state.named, &mut expected)?;
        expected_rows.push(expected);
    }

    if let Some(rows) = state.cache.table(&state.db_name, table_name) {
        for actual in rows.values() {
            if !row_matches_where(table, &state.named, actual, op.where_clause.as_deref())? {
                continue;
            }
            let actual = row::project(actual, op.columns.as_deref());
            for expected in &expected_rows {
                if row::rows_equal_by_schema(table, expected, &actual)? {
                    if equal {
                        return Ok(());
                    }
                    warn!(table = table_name, "wait: row still matches");
                    return Err(OvsdbError::TimedOut);
                }
            }
        }
    }
    if equal {
        warn!(table = table_name, "wait: no row matched");
        return Err(OvsdbError::TimedOut);
    }
    Ok(())
}

fn pre_commit(
    _state: &mut TxnState<'_>,
    op: &Operation,
    _result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    let Some(durable) = op.durable else {
        warn!("missing durable parameter");
        return Err(OvsdbError::ConstraintViolation);
    };
    // The whole transaction is already atomic on the backend; a durability
    // guarantee beyond that is out of scope.
    if durable {
        warn!("durable commit is not supported");
        return Err(OvsdbError::NotSupported);
    }
    Ok(())
}

fn pre_abort(
    _state: &mut TxnState<'_>,
    _op: &Operation,
    _result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    Err(OvsdbError::Aborted)
}

fn do_comment(
    state: &mut TxnState<'_>,
    op: &Operation,
    _result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    let comment = op.comment.as_ref().ok_or_else(|| {
        warn!("missing comment parameter");
        OvsdbError::ConstraintViolation
    })?;
    let timestamp = rfc3339_now();
    let flat = state.codec.comment_key(&state.db_name, &timestamp);
    state
        .buffer
        .put_unobserved(flat, comment.clone().into_bytes());
    Ok(())
}

fn pre_noop(
    _state: &mut TxnState<'_>,
    _op: &Operation,
    _result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    Ok(())
}

fn do_noop(
    _state: &mut TxnState<'_>,
    _op: &Operation,
    _result: &mut OperationResult,
) -> Result<(), OvsdbError> {
    Ok(())
}
