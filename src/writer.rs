use std::{fs::OpenOptions, path::Path, sync::mpsc::Receiver};

use log::error;
use serde_jsonlines::JsonLinesWriter;

use crate::{ConsoleError, event_log::LogEntry};

/// Appends every event log entry received on `entries` to `file` as JSON Lines, until the
/// sending side goes away.
pub fn write_event_log(file: &Path, entries: Receiver<LogEntry>) -> Result<(), ConsoleError> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .map_err(|e| ConsoleError::WriterError { source: e })?;
    let mut log_writer = JsonLinesWriter::new(log_file);
    for entry in &entries {
        let _ = log_writer.write(&entry).map_err(|e| {
            error!("Error while writing event log entry to output file: {}", e);
        });
        // entries are sparse, keep the file current for anyone tailing it
        log_writer
            .flush()
            .map_err(|e| ConsoleError::WriterError { source: e })?;
    }
    log_writer
        .flush()
        .map_err(|e| ConsoleError::WriterError { source: e })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread};

    use super::*;
    use crate::event_log::{EventLog, LogLevel};
    use tempfile::NamedTempFile;

    #[test]
    fn test_entries_are_written_as_json_lines() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let (tx, rx) = mpsc::channel();

        let writer_path = path.clone();
        let handle = thread::spawn(move || write_event_log(&writer_path, rx));
        let mut log = EventLog::default();
        log.attach_writer(tx);
        log.info("Connected to controller");
        log.warning("Cliff detected - stopping");
        drop(log);
        handle.join().unwrap().unwrap();

        let entries = serde_jsonlines::json_lines(&path)
            .unwrap()
            .collect::<Result<Vec<LogEntry>, std::io::Error>>()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].level, LogLevel::Warning);
        assert_eq!(entries[1].message, "Cliff detected - stopping");
    }
}
