//! Trial log sink – appends every sealed [`TrialRecord`] to a JSON-lines
//! file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use ballnav_middleware::{EventBus, Topic, TopicReceiver};
use ballnav_types::{EventPayload, TrialRecord};

pub struct TrialLogSink {
    receiver: TopicReceiver,
    writer: BufWriter<File>,
    written: usize,
}

impl TrialLogSink {
    /// Subscribe to [`Topic::TrialLog`] and open `path` for appending.
    pub fn create(path: &Path, bus: &EventBus) -> Result<Self, String> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("Failed to open trial log {}: {}", path.display(), e))?;
        Ok(Self {
            receiver: bus.subscribe_to(Topic::TrialLog),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Write every record published since the last call.  Returns how many
    /// were written.
    pub fn pump(&mut self) -> Result<usize, String> {
        let records: Vec<TrialRecord> = self
            .receiver
            .drain()
            .into_iter()
            .filter_map(|event| match event.payload {
                EventPayload::TrialCompleted(record) => Some(record),
                _ => None,
            })
            .collect();
        for record in &records {
            let line = serde_json::to_string(record)
                .map_err(|e| format!("Failed to serialize trial record: {}", e))?;
            writeln!(self.writer, "{line}")
                .map_err(|e| format!("Failed to write trial log: {}", e))?;
        }
        if !records.is_empty() {
            self.writer
                .flush()
                .map_err(|e| format!("Failed to flush trial log: {}", e))?;
        }
        self.written += records.len();
        Ok(records.len())
    }

    /// Records written over the sink's lifetime.
    pub fn written(&self) -> usize {
        self.written
    }
}
