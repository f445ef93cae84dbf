use crate::mlb::config::StoreCredentials;
use crate::mlb::db::{Row, UpsertSink};
use crate::mlb::error::SinkError;

use log::warn;
use serde_json::Value;
use std::time::Duration;

/// PostgREST endpoint of the hosted store. Each batch is one POST with
/// `merge-duplicates` resolution, which the server turns into
/// `INSERT ... ON CONFLICT (...) DO UPDATE`.
pub struct RestStore {
    agent: ureq::Agent,
    credentials: StoreCredentials,
}

impl RestStore {
    pub fn new(credentials: StoreCredentials, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        RestStore { agent, credentials }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.credentials.url, table)
    }
}

impl UpsertSink for RestStore {
    fn write_batch(&self, table: &str, rows: &[&Row], conflict_keys: &[&str]) -> Result<usize, SinkError> {
        let key = &self.credentials.service_key;
        let result = self
            .agent
            .post(&self.table_url(table))
            .query("on_conflict", &conflict_keys.join(","))
            .set("apikey", key)
            .set("Authorization", &format!("Bearer {}", key))
            .set("Content-Type", "application/json")
            .set("Prefer", "resolution=merge-duplicates,return=representation")
            .send_json(rows);

        match result {
            Ok(response) => match response.into_json::<Value>() {
                Ok(Value::Array(returned)) => Ok(returned.len()),
                Ok(_) | Err(_) => {
                    warn!("No row data returned for {}, assuming {} rows written", table, rows.len());
                    Ok(rows.len())
                }
            },
            Err(ureq::Error::Status(status, response)) => Err(SinkError::Rejected {
                table: table.to_string(),
                rows: rows.len(),
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => Err(SinkError::Transport {
                table: table.to_string(),
                rows: rows.len(),
                message: transport.to_string(),
            }),
        }
    }
}
