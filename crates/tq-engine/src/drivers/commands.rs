//! Command builders and reply decoding shared by the Redis drivers.
//!
//! The sync and pooled drivers differ only in how a command reaches the
//! server; the wire-level commands and replies are the same and live here.

use super::{RecordWrite, SearchRequest};
use crate::schema::{FieldType, IndexField, IndexSchema};
use redis::Value;
use tq_core::{Result, TrafficError};

pub fn drop_index(name: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("FT.DROPINDEX");
    cmd.arg(name);
    cmd
}

pub fn create_index(schema: &IndexSchema) -> redis::Cmd {
    let mut cmd = redis::cmd("FT.CREATE");
    cmd.arg(&schema.name)
        .arg("ON")
        .arg("HASH")
        .arg("PREFIX")
        .arg(1)
        .arg(schema.key_prefix());
    if schema.stopwords_disabled {
        cmd.arg("STOPWORDS").arg(0);
    }
    cmd.arg("SCHEMA");
    for field in &schema.fields {
        cmd.arg(&field.name).arg(field.field_type.as_str());
    }
    cmd
}

pub fn index_info(name: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("FT.INFO");
    cmd.arg(name);
    cmd
}

pub fn search(request: &SearchRequest) -> redis::Cmd {
    let mut cmd = redis::cmd("FT.SEARCH");
    cmd.arg(&request.index)
        .arg(&request.query)
        .arg("LIMIT")
        .arg(request.offset)
        .arg(request.limit);
    if !request.return_fields.is_empty() {
        cmd.arg("RETURN").arg(request.return_fields.len());
        for field in &request.return_fields {
            cmd.arg(field);
        }
    }
    cmd
}

/// One MULTI/EXEC block per batch.
pub fn write_batch(batch: &[RecordWrite]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for write in batch {
        pipe.hset_multiple(&write.key, &write.fields).ignore();
        for (set, member) in &write.set_adds {
            pipe.sadd(set, member).ignore();
        }
    }
    pipe
}

/// Map a client error onto the engine's taxonomy.
pub fn classify(err: redis::RedisError) -> TrafficError {
    if err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_io_error()
        || err.is_timeout()
        || err.kind() == redis::ErrorKind::AuthenticationFailed
    {
        return TrafficError::StoreUnavailable(err.to_string());
    }
    // Unknown server error codes surface as `OFFSET: exceeds ...`.
    let window_code = matches!(err.code(), Some("OFFSET") | Some("LIMIT"));
    let message = err.to_string();
    if window_code || message.contains("OFFSET exceeds") || message.contains("LIMIT exceeds") {
        TrafficError::OffsetLimitExceeded(message)
    } else {
        TrafficError::Query(message)
    }
}

pub fn value_str(value: &Value) -> Option<String> {
    match value {
        Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Status(s) => Some(s.clone()),
        Value::Int(n) => Some(n.to_string()),
        Value::Okay => Some("OK".to_string()),
        _ => None,
    }
}

/// Decoded `FT.SEARCH` reply: total plus `(key, flat name/value list)`.
pub fn decode_search(value: Value) -> Result<(i64, Vec<(String, Vec<String>)>)> {
    let items = match value {
        Value::Bulk(items) => items,
        other => {
            return Err(TrafficError::Query(format!(
                "unexpected search reply: {:?}",
                other
            )))
        }
    };

    let mut iter = items.into_iter();
    let total = match iter.next() {
        Some(Value::Int(n)) => n,
        other => {
            return Err(TrafficError::Query(format!(
                "search reply without a count: {:?}",
                other
            )))
        }
    };

    let mut documents = Vec::new();
    while let Some(key) = iter.next() {
        let key = value_str(&key)
            .ok_or_else(|| TrafficError::Query(format!("bad document key: {:?}", key)))?;
        let pairs = match iter.next() {
            Some(Value::Bulk(values)) => values.iter().filter_map(value_str).collect(),
            Some(Value::Nil) | None => Vec::new(),
            Some(other) => {
                return Err(TrafficError::Query(format!(
                    "bad field list for '{}': {:?}",
                    key, other
                )))
            }
        };
        documents.push((key, pairs));
    }
    Ok((total, documents))
}

/// Field list from an `FT.INFO` reply. Understands both the `attributes`
/// layout and the older `fields` layout.
pub fn decode_info_fields(value: Value) -> Result<Vec<IndexField>> {
    let items = match value {
        Value::Bulk(items) => items,
        other => {
            return Err(TrafficError::Query(format!(
                "unexpected info reply: {:?}",
                other
            )))
        }
    };

    let mut iter = items.into_iter();
    while let Some(name) = iter.next() {
        let section = iter.next();
        let is_fields = matches!(
            value_str(&name).as_deref(),
            Some("attributes") | Some("fields")
        );
        if !is_fields {
            continue;
        }
        let Some(Value::Bulk(entries)) = section else {
            return Ok(Vec::new());
        };
        return Ok(entries.iter().filter_map(decode_attribute).collect());
    }
    Ok(Vec::new())
}

fn decode_attribute(entry: &Value) -> Option<IndexField> {
    let Value::Bulk(parts) = entry else {
        return None;
    };
    let words: Vec<String> = parts.iter().filter_map(value_str).collect();
    let after = |key: &str| {
        words
            .iter()
            .position(|w| w.eq_ignore_ascii_case(key))
            .and_then(|i| words.get(i + 1))
    };
    let name = after("attribute")
        .or_else(|| after("identifier"))
        .or_else(|| words.first())?;
    let field_type = after("type").and_then(|t| FieldType::parse(t))?;
    Some(IndexField {
        name: name.clone(),
        field_type,
    })
}
