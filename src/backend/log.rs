//! Append-only log backend.
//!
//! Every mutation is appended to a single record log and `fsync`ed before
//! the operation completes. Opening a location replays the log into an
//! in-memory sorted map that serves reads.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/<location>/data.log
//!
//! [MAGIC(4)][VERSION_LE(4)][MAX_RECORD_SIZE_LE(4)][HEADER_CRC32_LE(4)]
//! [REC_LEN_LE][REC_BYTES][REC_CRC32_LE]
//! [REC_LEN_LE][REC_BYTES][REC_CRC32_LE]
//! ...
//! ```
//!
//! - **Header**: a [`LogHeader`] followed by a CRC32 over its 12 bytes.
//! - **Record**: a 4-byte length prefix, the JSON-encoded [`LogRecord`],
//!   and a CRC32 computed over `len || record_bytes`.
//!
//! # Recovery
//!
//! - A header or record checksum mismatch fails the open with
//!   [`LogError::ChecksumMismatch`] / [`LogError::InvalidHeader`].
//! - A record cut short at the end of the file (a torn final write) is
//!   dropped with a warning and the file is truncated back to the last
//!   complete record, so later appends stay readable.
//!
//! File I/O runs on tokio's blocking pool.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, trace, warn};

use super::{OpenPolicy, check_key, poisoned};
use crate::StoreError;
use crate::handle::{Entry, Handle, IterateOptions};

const U32_SIZE: usize = std::mem::size_of::<u32>();

/// File name of the record log inside a location directory.
pub const LOG_FILE_NAME: &str = "data.log";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by log file operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record serialization error.
    #[error("Serialization (encode) error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Record deserialization error.
    #[error("Deserialization (decode) error: {0}")]
    Decode(#[source] serde_json::Error),

    /// Data integrity failure: checksum did not match.
    #[error("Checksum mismatch at offset {0}")]
    ChecksumMismatch(u64),

    /// Record exceeds the configured maximum size.
    #[error("Record size exceeds limit ({0} bytes)")]
    RecordTooLarge(usize),

    /// Log header failed integrity validation.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

// ------------------------------------------------------------------------------------------------
// Header / Record structures
// ------------------------------------------------------------------------------------------------

/// Metadata written at the start of every log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    /// Magic constant identifying log files (`b"SCLG"`).
    pub magic: [u8; 4],

    /// Log format version.
    pub version: u32,

    /// Maximum record size (in bytes).
    pub max_record_size: u32,
}

impl LogHeader {
    /// Expected 4-byte magic constant.
    pub const MAGIC: [u8; 4] = *b"SCLG";

    /// Current supported version number.
    pub const VERSION: u32 = 1;

    /// Default maximum record size (1 MiB).
    pub const DEFAULT_MAX_RECORD_SIZE: u32 = 1024 * 1024;

    /// Encoded size, excluding the trailing checksum.
    pub const ENCODED_LEN: usize = 12;

    pub fn new(max_record_size: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            max_record_size,
        }
    }

    fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.max_record_size.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; Self::ENCODED_LEN]) -> Result<Self, LogError> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != Self::MAGIC {
            return Err(LogError::InvalidHeader("bad magic".into()));
        }

        let mut word = [0u8; U32_SIZE];
        word.copy_from_slice(&buf[4..8]);
        let version = u32::from_le_bytes(word);
        if version != Self::VERSION {
            return Err(LogError::InvalidHeader(format!(
                "unsupported version {version}"
            )));
        }

        word.copy_from_slice(&buf[8..12]);
        Ok(Self {
            magic,
            version,
            max_record_size: u32::from_le_bytes(word),
        })
    }
}

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LogRecord {
    Put { key: String, value: Value },
    Del { key: String },
}

impl LogRecord {
    fn apply(self, map: &mut BTreeMap<String, Value>) {
        match self {
            LogRecord::Put { key, value } => {
                map.insert(key, value);
            }
            LogRecord::Del { key } => {
                map.remove(&key);
            }
        }
    }
}

fn checksum(parts: &[&[u8]]) -> u32 {
    let mut hasher = Crc32::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

// ------------------------------------------------------------------------------------------------
// Log file
// ------------------------------------------------------------------------------------------------

/// An open record log.
#[derive(Debug)]
pub(crate) struct LogFile {
    file: File,
    path: PathBuf,
    header: LogHeader,
}

impl LogFile {
    /// Open or create the log at `path`, writing a fresh header if the file
    /// is empty and validating the existing one otherwise.
    pub(crate) fn open(path: &Path, max_record_size: u32) -> Result<Self, LogError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let header = if file.metadata()?.len() == 0 {
            let header = LogHeader::new(max_record_size);
            let bytes = header.encode();

            file.write_all(&bytes)?;
            file.write_all(&checksum(&[&bytes]).to_le_bytes())?;
            file.sync_all()?;

            info!("Created new log header at {}", path.display());
            header
        } else {
            file.seek(SeekFrom::Start(0))?;

            let mut bytes = [0u8; LogHeader::ENCODED_LEN];
            let mut crc = [0u8; U32_SIZE];
            file.read_exact(&mut bytes)
                .and_then(|_| file.read_exact(&mut crc))
                .map_err(|e| match e.kind() {
                    io::ErrorKind::UnexpectedEof => LogError::InvalidHeader("truncated".into()),
                    _ => LogError::Io(e),
                })?;

            if u32::from_le_bytes(crc) != checksum(&[&bytes]) {
                return Err(LogError::InvalidHeader("header checksum mismatched".into()));
            }

            let header = LogHeader::decode(&bytes)?;
            info!(
                "Loaded log header from {} (max_record_size={})",
                path.display(),
                header.max_record_size
            );
            header
        };

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header,
        })
    }

    fn records_start() -> u64 {
        (LogHeader::ENCODED_LEN + U32_SIZE) as u64
    }

    /// Appends one record and syncs it to disk.
    pub(crate) fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        trace!("Appending record: {:?}", record);

        let bytes = serde_json::to_vec(record).map_err(LogError::Encode)?;
        let len = frame_len(bytes.len(), self.header.max_record_size)?;

        let crc = checksum(&[&len.to_le_bytes(), &bytes]);

        let mut frame = Vec::with_capacity(bytes.len() + 2 * U32_SIZE);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&bytes);
        frame.extend_from_slice(&crc.to_le_bytes());

        self.file.write_all(&frame)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Reads every record back in append order.
    ///
    /// A torn final record is dropped and the file truncated to the last
    /// complete one.
    pub(crate) fn replay(&mut self) -> Result<Vec<LogRecord>, LogError> {
        info!("Starting log replay from file: {}", self.path.display());

        let mut offset = Self::records_start();
        self.file.seek(SeekFrom::Start(offset))?;

        let mut records = Vec::new();
        loop {
            let mut len_bytes = [0u8; U32_SIZE];
            match read_full(&mut self.file, &mut len_bytes)? {
                0 => break,
                n if n < U32_SIZE => {
                    self.drop_torn_tail(offset)?;
                    break;
                }
                _ => {}
            }

            let len = u32::from_le_bytes(len_bytes) as usize;
            if len > self.header.max_record_size as usize {
                return Err(LogError::RecordTooLarge(len));
            }

            let mut body = vec![0u8; len + U32_SIZE];
            if read_full(&mut self.file, &mut body)? < body.len() {
                self.drop_torn_tail(offset)?;
                break;
            }

            let (bytes, crc) = body.split_at(len);
            let mut stored = [0u8; U32_SIZE];
            stored.copy_from_slice(crc);
            if u32::from_le_bytes(stored) != checksum(&[&len_bytes, bytes]) {
                error!("Checksum mismatch for record at offset {}", offset);
                return Err(LogError::ChecksumMismatch(offset));
            }

            records.push(serde_json::from_slice(bytes).map_err(LogError::Decode)?);
            offset += (2 * U32_SIZE + len) as u64;
        }

        info!(records = records.len(), "log replay finished");
        Ok(records)
    }

    fn drop_torn_tail(&mut self, offset: u64) -> Result<(), LogError> {
        warn!(
            "Truncated record at offset {} in {}, dropping tail",
            offset,
            self.path.display()
        );
        self.file.set_len(offset)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub(crate) fn sync(&self) -> Result<(), LogError> {
        Ok(self.file.sync_all()?)
    }
}

/// Length prefix for a record of `len` bytes, checked against `max`.
pub(super) fn frame_len(len: usize, max: u32) -> Result<u32, LogError> {
    match u32::try_from(len) {
        Ok(prefix) if prefix <= max => Ok(prefix),
        _ => Err(LogError::RecordTooLarge(len)),
    }
}

/// Reads until `buf` is full or EOF. Returns the number of bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ------------------------------------------------------------------------------------------------
// Backend handle
// ------------------------------------------------------------------------------------------------

type Index = BTreeMap<String, Value>;

/// Innermost handle persisting to `<root>/<location>/data.log`.
///
/// The file and the in-memory index sit behind separate locks. Writers hold
/// the file lock across append and `fsync`, and take the index lock only to
/// apply the record afterwards, so readers never wait on disk I/O.
pub struct LogBackend {
    root: PathBuf,
    location: String,
    policy: OpenPolicy,
    max_record_size: u32,
    pub(super) log: Arc<Mutex<Option<LogFile>>>,
    index: Arc<RwLock<Option<Index>>>,
}

impl std::fmt::Debug for LogBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBackend")
            .field("root", &self.root)
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl LogBackend {
    pub const KIND: &'static str = "log";

    pub fn new(root: impl Into<PathBuf>, location: impl Into<String>, policy: OpenPolicy) -> Self {
        Self {
            root: root.into(),
            location: location.into(),
            policy,
            max_record_size: LogHeader::DEFAULT_MAX_RECORD_SIZE,
            log: Arc::new(Mutex::new(None)),
            index: Arc::new(RwLock::new(None)),
        }
    }

    /// Overrides the maximum encoded record size.
    pub fn with_max_record_size(mut self, max_record_size: u32) -> Self {
        self.max_record_size = max_record_size;
        self
    }

    /// Directory holding the log for `location` under `root`.
    ///
    /// Locations are single path components; anything that could escape
    /// `root` is rejected.
    pub fn location_dir(root: &Path, location: &str) -> Result<PathBuf, StoreError> {
        let valid = !location.is_empty()
            && location != "."
            && location != ".."
            && !location.contains(['/', '\\']);
        if !valid {
            return Err(StoreError::InvalidArgument(format!(
                "invalid location {location:?}"
            )));
        }
        Ok(root.join(location))
    }

    /// Removes everything stored at `location`. Returns `true` if the
    /// location existed.
    pub fn destroy(root: &Path, location: &str) -> Result<bool, StoreError> {
        let dir = Self::location_dir(root, location)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(dir = %dir.display(), "log store destroyed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Appends `record` on the blocking pool, then applies it to the index.
    async fn append(&self, record: LogRecord) -> Result<(), StoreError> {
        let log = Arc::clone(&self.log);
        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut log = log.lock().map_err(poisoned)?;
            let file = log.as_mut().ok_or(StoreError::NotOpen)?;
            file.append(&record)?;

            let mut index = index.write().map_err(poisoned)?;
            let map = index.as_mut().ok_or(StoreError::NotOpen)?;
            record.apply(map);
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }

    fn read<T>(&self, f: impl FnOnce(&Index) -> T) -> Result<T, StoreError> {
        let index = self.index.read().map_err(poisoned)?;
        index.as_ref().map(f).ok_or(StoreError::NotOpen)
    }
}

#[async_trait]
impl Handle for LogBackend {
    async fn open(&self) -> Result<(), StoreError> {
        let dir = Self::location_dir(&self.root, &self.location)?;
        let policy = self.policy;
        let location = self.location.clone();
        let max_record_size = self.max_record_size;
        let log = Arc::clone(&self.log);
        let index = Arc::clone(&self.index);

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut slot = log.lock().map_err(poisoned)?;
            if slot.is_some() {
                return Ok(());
            }

            let path = dir.join(LOG_FILE_NAME);
            policy.check(&location, path.exists())?;
            fs::create_dir_all(&dir)?;

            let mut file = LogFile::open(&path, max_record_size)?;
            let mut map = Index::new();
            for record in file.replay()? {
                record.apply(&mut map);
            }

            info!(location = %location, keys = map.len(), "log backend opened");
            *index.write().map_err(poisoned)? = Some(map);
            *slot = Some(file);
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }

    async fn close(&self) -> Result<(), StoreError> {
        let log = Arc::clone(&self.log);
        let index = Arc::clone(&self.index);
        let location = self.location.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let mut slot = log.lock().map_err(poisoned)?;
            index.write().map_err(poisoned)?.take();
            if let Some(file) = slot.take() {
                file.sync()?;
                info!(location = %location, "log backend closed");
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking task failed: {e}")))?
    }

    fn is_open(&self) -> bool {
        self.index.read().map(|i| i.is_some()).unwrap_or(false)
    }

    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        check_key(key)?;
        self.read(|map| map.get(key).cloned())?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        check_key(key)?;
        self.append(LogRecord::Put {
            key: key.to_string(),
            value,
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.append(LogRecord::Del {
            key: key.to_string(),
        })
        .await
    }

    async fn iterate(&self, options: IterateOptions) -> Result<Vec<Entry>, StoreError> {
        self.read(|map| options.apply(map.iter().map(|(k, v)| (k.clone(), v.clone()))))
    }

    fn kind(&self) -> Option<&str> {
        Some(Self::KIND)
    }
}
