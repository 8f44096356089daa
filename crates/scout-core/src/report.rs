use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    domain::{DeadLetter, Partition, SearchType},
    Result,
};

/// What one run did, for the final log line and the optional JSON report.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub search_type: SearchType,
    pub quota: usize,
    pub remaining: usize,
    pub expanded_queries: usize,
    pub channel_records: usize,
    pub chat_records: usize,
    pub accounts_total: usize,
    pub accounts_connected: usize,
    pub accounts_skipped: usize,
    pub accounts_abandoned: usize,
    pub dead_letters: Vec<DeadLetter>,
}

impl RunSummary {
    pub fn new(search_type: SearchType, quota: usize, accounts_total: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            search_type,
            quota,
            remaining: quota,
            expanded_queries: 0,
            channel_records: 0,
            chat_records: 0,
            accounts_total,
            accounts_connected: 0,
            accounts_skipped: 0,
            accounts_abandoned: 0,
            dead_letters: Vec::new(),
        }
    }

    pub fn record(&mut self, partition: Partition) {
        match partition {
            Partition::Channels => self.channel_records += 1,
            Partition::Chats => self.chat_records += 1,
        }
    }

    pub fn total_records(&self) -> usize {
        self.channel_records + self.chat_records
    }

    pub fn finish(&mut self, remaining: usize, dead_letters: &[DeadLetter]) {
        self.remaining = remaining;
        self.dead_letters = dead_letters.to_vec();
        self.finished_at = Some(Utc::now());
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)?;
        Ok(())
    }
}
