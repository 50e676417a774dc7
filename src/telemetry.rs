use std::collections::VecDeque;
use std::sync::Mutex;

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

pub const TELEMETRY_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// One synthetic request/response record for the operator dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerLog {
    pub id: String,
    pub timestamp: i64,
    pub method: HttpMethod,
    pub endpoint: String,
    pub status: u16,
    pub message: String,
}

impl ServerLog {
    pub fn new(method: HttpMethod, endpoint: &str, status: u16, message: impl Into<String>) -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        Self {
            id,
            timestamp: crate::now_millis(),
            method,
            endpoint: endpoint.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Newest-first ring buffer. Not persisted.
#[derive(Debug)]
pub struct TelemetryLog {
    entries: Mutex<VecDeque<ServerLog>>,
    capacity: usize,
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::with_capacity(TELEMETRY_CAPACITY)
    }
}

impl TelemetryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
        }
    }

    pub fn append(&self, entry: ServerLog) {
        tracing::debug!(
            method = ?entry.method,
            endpoint = %entry.endpoint,
            status = entry.status,
            message = %entry.message,
            "telemetry"
        );
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    pub fn snapshot(&self) -> Vec<ServerLog> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.iter().cloned().collect()
    }
}
