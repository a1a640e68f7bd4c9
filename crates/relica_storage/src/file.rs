//! File-backed record store.

use crate::error::{StorageError, StorageResult};
use crate::filter::Filter;
use crate::memory::InMemoryStore;
use crate::record::Record;
use crate::store::RecordStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Frame header: payload length (u32 LE) followed by CRC32 (u32 LE).
const FRAME_HEADER_LEN: usize = 8;

/// Default connector name of [`FileStore`].
const DEFAULT_CONNECTOR: &str = "file";

/// One mutation in the store log.
#[derive(Debug, Serialize, Deserialize)]
enum LogEntry {
    Save { model: String, record: Record },
    Destroy { model: String, id: String },
}

/// A record store persisted as an append-only log.
///
/// Every `save` and `destroy` appends a checksummed CBOR frame to the log
/// file; the full record set is kept in memory and rebuilt by replaying the
/// log on open. A torn or corrupted tail (for example after a crash during
/// an append) is truncated on open.
///
/// # Durability
///
/// Each mutation is flushed to the OS before the call returns. Call
/// [`FileStore::sync`] to force the log to disk.
///
/// # Example
///
/// ```no_run
/// use relica_storage::{FileStore, Record, RecordStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("todo.log")).unwrap();
/// store.save("todo", Record::new("1").with_field("title", "milk")).unwrap();
/// store.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    log: Mutex<File>,
    index: InMemoryStore,
}

impl FileStore {
    /// Opens or creates a store at the given path with connector name `file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or replayed.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_named(path, DEFAULT_CONNECTOR)
    }

    /// Opens or creates a store with a custom connector name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or replayed.
    pub fn open_named(path: &Path, connector: &str) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let index = InMemoryStore::with_connector_name(connector);
        let valid_len = replay(&mut file, &index)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn tail of store log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            log: Mutex::new(file),
            index,
        })
    }

    /// Returns the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the log to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.log.lock().sync_all()?;
        Ok(())
    }

    /// Rewrites the log so it only holds the live records.
    ///
    /// # Errors
    ///
    /// Returns an error if the compacted log cannot be written.
    pub fn compact(&self) -> StorageResult<()> {
        let mut log = self.log.lock();
        let tmp_path = self.path.with_extension("compact");

        {
            let mut tmp = File::create(&tmp_path)?;
            for model in self.index.models() {
                for record in self.index.records(&model) {
                    let entry = LogEntry::Save {
                        model: model.clone(),
                        record,
                    };
                    tmp.write_all(&encode_frame(&entry)?)?;
                }
            }
            tmp.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        let mut reopened = OpenOptions::new().read(true).write(true).open(&self.path)?;
        reopened.seek(SeekFrom::End(0))?;
        *log = reopened;
        Ok(())
    }

    fn append(&self, log: &mut File, entry: &LogEntry) -> StorageResult<()> {
        let frame = encode_frame(entry)?;
        log.seek(SeekFrom::End(0))?;
        log.write_all(&frame)?;
        log.flush()?;
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn connector_name(&self) -> &str {
        self.index.connector_name()
    }

    fn find(&self, model: &str, filter: &Filter) -> StorageResult<Vec<Record>> {
        self.index.find(model, filter)
    }

    fn find_by_id(&self, model: &str, id: &str) -> StorageResult<Option<Record>> {
        self.index.find_by_id(model, id)
    }

    fn save(&self, model: &str, record: Record) -> StorageResult<Record> {
        let mut log = self.log.lock();
        let entry = LogEntry::Save {
            model: model.to_string(),
            record: record.clone(),
        };
        self.append(&mut log, &entry)?;
        self.index.save(model, record)
    }

    fn destroy(&self, model: &str, id: &str) -> StorageResult<bool> {
        let mut log = self.log.lock();
        if self.index.find_by_id(model, id)?.is_none() {
            return Ok(false);
        }
        let entry = LogEntry::Destroy {
            model: model.to_string(),
            id: id.to_string(),
        };
        self.append(&mut log, &entry)?;
        self.index.destroy(model, id)
    }
}

fn encode_frame(entry: &LogEntry) -> StorageResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(entry, &mut payload).map_err(|e| StorageError::codec(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::codec("log entry exceeds 4 GiB"))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Replays every intact frame into `index`, returning the length of the
/// valid prefix of the log.
fn replay(file: &mut File, index: &InMemoryStore) -> StorageResult<u64> {
    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;

    let mut offset = 0usize;
    while bytes.len() - offset >= FRAME_HEADER_LEN {
        let header = &bytes[offset..offset + FRAME_HEADER_LEN];
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let start = offset + FRAME_HEADER_LEN;
        let Some(payload) = bytes.get(start..start + len) else {
            break;
        };
        if crc32fast::hash(payload) != crc {
            break;
        }
        let entry: LogEntry = match ciborium::from_reader(payload) {
            Ok(entry) => entry,
            Err(_) => break,
        };

        match entry {
            LogEntry::Save { model, record } => {
                index.save(&model, record)?;
            }
            LogEntry::Destroy { model, id } => {
                index.destroy(&model, &id)?;
            }
        }
        offset = start + len;
    }

    Ok(offset as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let store = FileStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.connector_name(), "file");
        assert!(store.find("todo", &Filter::new()).unwrap().is_empty());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let store = FileStore::open(&path).unwrap();
            store.save("todo", Record::new("1").with_field("t", "a")).unwrap();
            store.save("todo", Record::new("2").with_field("t", "b")).unwrap();
            store.save("todo", Record::new("1").with_field("t", "c")).unwrap();
            store.destroy("todo", "2").unwrap();
            store.sync().unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let all = store.find("todo", &Filter::new()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fields["t"], "c");
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let store = FileStore::open(&path).unwrap();
            store.save("todo", Record::new("1")).unwrap();
        }
        let intact_len = fs::metadata(&path).unwrap().len();

        // Simulate a crash in the middle of an append
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0x10, 0, 0, 0, 0xde, 0xad]).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert!(store.find_by_id("todo", "1").unwrap().is_some());
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);

        store.save("todo", Record::new("2")).unwrap();
        drop(store);
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.find("todo", &Filter::new()).unwrap().len(), 2);
    }

    #[test]
    fn corrupted_frame_stops_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        {
            let store = FileStore::open(&path).unwrap();
            store.save("todo", Record::new("1")).unwrap();
            store.save("todo", Record::new("2")).unwrap();
        }

        // Flip a payload byte of the last frame
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.find_by_id("todo", "1").unwrap().is_some());
        assert!(store.find_by_id("todo", "2").unwrap().is_none());
    }

    #[test]
    fn destroy_absent_appends_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let store = FileStore::open(&path).unwrap();
        assert!(!store.destroy("todo", "ghost").unwrap());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn compact_keeps_live_records_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let store = FileStore::open(&path).unwrap();
        for i in 0..20 {
            store
                .save("n", Record::new("same").with_field("i", i))
                .unwrap();
        }
        let before = fs::metadata(&path).unwrap().len();
        store.compact().unwrap();
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before);

        store.save("n", Record::new("other")).unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        let same = store.find_by_id("n", "same").unwrap().unwrap();
        assert_eq!(same.fields["i"], 19);
        assert!(store.find_by_id("n", "other").unwrap().is_some());
    }

    #[test]
    fn custom_connector_name() {
        let dir = tempdir().unwrap();
        let store = FileStore::open_named(&dir.path().join("s.log"), "server").unwrap();
        assert_eq!(store.connector_name(), "server");
    }
}
