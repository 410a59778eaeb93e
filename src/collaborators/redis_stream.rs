//! Redis-backed `StreamClient`
//!
//! The one collaborator this crate ships a concrete production
//! implementation for, since §6 pins its wire semantics down precisely:
//! consumer groups, `xreadgroup`/`xack`, and capped `xadd`. Every message is
//! carried as a single `data` field holding the JSON-encoded payload —
//! simplest thing that lets an untyped payload survive a stream entry's
//! field/value pairs. Commands are issued with raw `redis::cmd(...)` calls,
//! same style as this crate's ancestor's `cache.rs` uses for `GET`/`SET`,
//! rather than the typed stream helpers — keeps the reply parsing explicit
//! and avoids coupling to a stream-API shape that has shifted across
//! `redis` crate releases.

use super::{StreamClient, StreamMessage};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Value};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

const DATA_FIELD: &str = "data";

#[derive(Clone)]
pub struct RedisStreamClient {
    conn: MultiplexedConnection,
}

impl RedisStreamClient {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { conn })
    }
}

/// Pulls a UTF-8 string out of a raw `Value`, whatever flavor the server
/// replied with.
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Data(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        Value::Status(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

/// Parses one `XREADGROUP` reply (`[[stream, [[id, [field, value, ...]], ...]], ...]`)
/// into a flat list of messages, extracting the JSON payload from `DATA_FIELD`.
fn parse_xreadgroup_reply(stream: &str, reply: Value) -> Vec<StreamMessage> {
    let mut messages = Vec::new();
    let Value::Bulk(streams) = reply else {
        return messages;
    };
    for entry in streams {
        let Value::Bulk(pair) = entry else { continue };
        if pair.len() != 2 {
            continue;
        }
        let Value::Bulk(ids) = &pair[1] else { continue };
        for id_entry in ids {
            let Value::Bulk(id_fields) = id_entry else { continue };
            if id_fields.len() != 2 {
                continue;
            }
            let Some(id) = value_to_string(&id_fields[0]) else { continue };
            let Value::Bulk(fields) = &id_fields[1] else { continue };

            let mut payload = JsonValue::Null;
            let mut i = 0;
            while i + 1 < fields.len() {
                if value_to_string(&fields[i]).as_deref() == Some(DATA_FIELD) {
                    if let Some(raw) = value_to_string(&fields[i + 1]) {
                        payload = serde_json::from_str(&raw).unwrap_or(JsonValue::Null);
                    }
                }
                i += 2;
            }
            if payload.is_null() {
                warn!(stream, id = %id, "stream entry missing data field");
            }
            messages.push(StreamMessage { id, payload });
        }
    }
    messages
}

#[async_trait]
impl StreamClient for RedisStreamClient {
    async fn create_consumer_group(&self, stream: &str, group: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            // BUSYGROUP: consumer group already exists — idempotent start.
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream, group, "consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn xreadgroup(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> anyhow::Result<Vec<StreamMessage>> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;
        Ok(parse_xreadgroup_reply(stream, reply))
    }

    async fn xack(&self, stream: &str, group: &str, id: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn xadd_with_limit(&self, stream: &str, payload: &JsonValue, cap: usize) -> anyhow::Result<String> {
        let mut conn = self.conn.clone();
        let encoded = serde_json::to_string(payload)?;
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(cap)
            .arg("*")
            .arg(DATA_FIELD)
            .arg(encoded)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        // MultiplexedConnection has no explicit close; dropping the last
        // clone tears down the underlying task. Nothing to do here beyond
        // giving callers a symmetric contract with the in-memory client.
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}
