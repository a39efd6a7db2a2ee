//! Record store: the payload file the index points into.
//!
//! The file is a plain concatenation of frames `[u32 length][payload]`, the
//! length encoded in the store's configured byte order. Record boundaries are
//! always taken from the length prefixes, never inferred from content.
//!
//! A handle is either in append mode (build phase) or in read-only mode
//! (query phase), never both. `seal` switches a build handle to read-only.
//!
//! Appends go to a temporary file next to the store path. The file replaces
//! the store path only when the handle is sealed or closed, so an existing
//! store stays intact for its readers until then, and a handle dropped
//! without sealing leaves no trace.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tempfile::NamedTempFile;

use crate::codec::{encode_u32, ByteOrder, EndianReader};

use super::qtree_constants::RECORD_PREFIX_SIZE;
use super::qtree_types::{RecordRef, SpatialError, SpatialResult};

/// Access mode of a [`RecordStore`] handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Append,
    ReadOnly,
    Closed,
}

enum StoreHandle {
    Append {
        writer: BufWriter<NamedTempFile>,
        next_offset: u64,
        record_count: u64,
    },
    ReadOnly {
        file: File,
        len: u64,
    },
    Closed,
}

impl StoreHandle {
    fn mode(&self) -> StoreMode {
        match self {
            StoreHandle::Append { .. } => StoreMode::Append,
            StoreHandle::ReadOnly { .. } => StoreMode::ReadOnly,
            StoreHandle::Closed => StoreMode::Closed,
        }
    }
}

/// Length-prefixed binary record file.
///
/// Reads seek and read under an exclusive lock on the file handle, so a
/// store can be shared between threads as `Arc<RecordStore>`.
pub struct RecordStore {
    path: PathBuf,
    order: ByteOrder,
    handle: RwLock<StoreHandle>,
    records_read: AtomicU64,
    bytes_read: AtomicU64,
}

impl RecordStore {
    /// Create a new, empty store in append mode.
    ///
    /// An existing file at `path` is left untouched until the new store is
    /// sealed or closed, at which point it is atomically replaced.
    pub fn create(path: impl AsRef<Path>, order: ByteOrder) -> SpatialResult<Self> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)?;

        log::debug!(
            "Created record store {} (staging at {})",
            path.display(),
            temp.path().display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            order,
            handle: RwLock::new(StoreHandle::Append {
                writer: BufWriter::new(temp),
                next_offset: 0,
                record_count: 0,
            }),
            records_read: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        })
    }

    /// Open an existing store in read-only mode.
    pub fn open(path: impl AsRef<Path>, order: ByteOrder) -> SpatialResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).open(path)?;
        let len = file.metadata()?.len();

        log::debug!("Opened record store {} ({} bytes)", path.display(), len);
        Ok(Self {
            path: path.to_path_buf(),
            order,
            handle: RwLock::new(StoreHandle::ReadOnly { file, len }),
            records_read: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn mode(&self) -> StoreMode {
        self.handle.read().mode()
    }

    /// Total size of the store in bytes (written so far, in append mode).
    pub fn len_bytes(&self) -> SpatialResult<u64> {
        match &*self.handle.read() {
            StoreHandle::Append { next_offset, .. } => Ok(*next_offset),
            StoreHandle::ReadOnly { len, .. } => Ok(*len),
            StoreHandle::Closed => Err(closed_error(&self.path)),
        }
    }

    /// Number of records in the store. Counted while appending; computed by
    /// walking the length prefixes in read-only mode.
    pub fn record_count(&self) -> SpatialResult<u64> {
        if let StoreHandle::Append { record_count, .. } = &*self.handle.read() {
            return Ok(*record_count);
        }

        let len = self.len_bytes()?;
        let mut offset = 0;
        let mut count = 0;
        while offset < len {
            let length = self.read_length_prefix(offset)?;
            offset = RecordRef::new(offset, length).end_offset()?;
            count += 1;
        }
        if offset > len {
            return Err(SpatialError::TruncatedRecord {
                offset: len,
                needed: offset - len,
                available: 0,
            });
        }
        Ok(count)
    }

    /// Append one record and return its reference. Only valid in append mode.
    pub fn append(&self, payload: &[u8]) -> SpatialResult<RecordRef> {
        let length = u32::try_from(payload.len()).map_err(|_| {
            SpatialError::InvalidArgument(format!(
                "record of {} bytes exceeds the u32 length prefix",
                payload.len()
            ))
        })?;

        let mut handle = self.handle.write();
        match &mut *handle {
            StoreHandle::Append {
                writer,
                next_offset,
                record_count,
            } => {
                let record = RecordRef::new(*next_offset, length);
                let end_offset = record.end_offset()?;
                writer.write_all(&encode_u32(self.order, length))?;
                writer.write_all(payload)?;
                *next_offset = end_offset;
                *record_count += 1;
                Ok(record)
            }
            StoreHandle::ReadOnly { .. } => Err(SpatialError::ReadOnlyViolation(self.path.clone())),
            StoreHandle::Closed => Err(closed_error(&self.path)),
        }
    }

    /// Read the payload of a record. Only valid in read-only mode.
    ///
    /// The stored length prefix must match `record.length`.
    pub fn read(&self, record: RecordRef) -> SpatialResult<Vec<u8>> {
        let mut handle = self.handle.write();
        let (file, len) = read_only_parts(&mut *handle, &self.path)?;

        let end_offset = record.end_offset()?;
        if end_offset > len {
            return Err(SpatialError::TruncatedRecord {
                offset: record.offset,
                needed: end_offset - record.offset,
                available: len.saturating_sub(record.offset),
            });
        }

        file.seek(SeekFrom::Start(record.offset))?;
        let mut reader = EndianReader::with_position(&mut *file, self.order, record.offset);
        let stored = reader.read_u32()?;
        if stored != record.length {
            return Err(SpatialError::InvalidArgument(format!(
                "record at offset {} has length {}, reference says {}",
                record.offset, stored, record.length
            )));
        }
        let payload = reader.read_bytes(record.length as usize)?;

        self.records_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(payload.len() as u64, Ordering::Relaxed);
        Ok(payload)
    }

    /// Read the length prefix of the frame starting at `offset`.
    pub fn read_length_prefix(&self, offset: u64) -> SpatialResult<u32> {
        let mut handle = self.handle.write();
        let (file, len) = read_only_parts(&mut *handle, &self.path)?;

        let prefix_end = offset.checked_add(RECORD_PREFIX_SIZE as u64);
        if prefix_end.map_or(true, |end| end > len) {
            return Err(SpatialError::TruncatedRecord {
                offset,
                needed: RECORD_PREFIX_SIZE as u64,
                available: len.saturating_sub(offset),
            });
        }
        file.seek(SeekFrom::Start(offset))?;
        EndianReader::with_position(&mut *file, self.order, offset).read_u32()
    }

    /// Read the whole frame starting at `offset`.
    fn read_frame_at(&self, offset: u64) -> SpatialResult<(RecordRef, Vec<u8>)> {
        let length = self.read_length_prefix(offset)?;
        let record = RecordRef::new(offset, length);
        let payload = self.read(record)?;
        Ok((record, payload))
    }

    /// Iterate over all records from the start of the file.
    ///
    /// Each call starts a fresh pass. Records are read one at a time as the
    /// iterator advances.
    pub fn iterate(&self) -> RecordIter<'_> {
        RecordIter {
            store: self,
            offset: 0,
            done: false,
        }
    }

    /// Flush, sync and publish an append-mode handle over the store path,
    /// then switch it to read-only mode.
    ///
    /// Sealing an already read-only store is a no-op.
    pub fn seal(&self) -> SpatialResult<()> {
        let mut handle = self.handle.write();
        match std::mem::replace(&mut *handle, StoreHandle::Closed) {
            StoreHandle::Append {
                writer,
                record_count,
                ..
            } => {
                publish(writer, &self.path)?;

                let file = OpenOptions::new().read(true).open(&self.path)?;
                let len = file.metadata()?.len();
                log::debug!(
                    "Sealed record store {} ({} records, {} bytes)",
                    self.path.display(),
                    record_count,
                    len
                );
                *handle = StoreHandle::ReadOnly { file, len };
                Ok(())
            }
            read_only @ StoreHandle::ReadOnly { .. } => {
                *handle = read_only;
                Ok(())
            }
            StoreHandle::Closed => Err(closed_error(&self.path)),
        }
    }

    /// Close the handle, publishing pending appends over the store path.
    /// Closing twice is a no-op.
    pub fn close(&self) -> SpatialResult<()> {
        let mut handle = self.handle.write();
        if let StoreHandle::Append { writer, .. } =
            std::mem::replace(&mut *handle, StoreHandle::Closed)
        {
            publish(writer, &self.path)?;
        }
        Ok(())
    }

    /// Number of successful `read` calls on this handle.
    pub fn records_read(&self) -> u64 {
        self.records_read.load(Ordering::Relaxed)
    }

    /// Payload bytes returned by `read` on this handle.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        // the staging file deletes itself
        if let StoreHandle::Append { record_count, .. } = self.handle.get_mut() {
            log::debug!(
                "Discarding {} unsealed records for {}",
                record_count,
                self.path.display()
            );
        }
    }
}

/// Flush and sync the staging file, then rename it over `path`.
fn publish(writer: BufWriter<NamedTempFile>, path: &Path) -> SpatialResult<()> {
    let temp = writer.into_inner().map_err(|e| e.into_error())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| SpatialError::Io(e.error))?;
    Ok(())
}

fn closed_error(path: &Path) -> SpatialError {
    SpatialError::InvalidState(format!("record store {} is closed", path.display()))
}

fn read_only_parts<'a>(
    handle: &'a mut StoreHandle,
    path: &Path,
) -> SpatialResult<(&'a mut File, u64)> {
    match handle {
        StoreHandle::ReadOnly { file, len } => Ok((file, *len)),
        StoreHandle::Append { .. } => Err(SpatialError::InvalidState(format!(
            "record store {} is open for appending, seal it before reading",
            path.display()
        ))),
        StoreHandle::Closed => Err(closed_error(path)),
    }
}

/// Lazy pass over every record of a read-only store.
///
/// Yields an error at most once, then ends.
pub struct RecordIter<'a> {
    store: &'a RecordStore,
    offset: u64,
    done: bool,
}

impl Iterator for RecordIter<'_> {
    type Item = SpatialResult<(RecordRef, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let len = match self.store.len_bytes() {
            Ok(len) => len,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        if self.offset >= len {
            self.done = true;
            return None;
        }

        match self.store.read_frame_at(self.offset) {
            Ok((record, payload)) => match record.end_offset() {
                Ok(end_offset) => {
                    self.offset = end_offset;
                    Some(Ok((record, payload)))
                }
                Err(e) => {
                    self.done = true;
                    Some(Err(e))
                }
            },
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sealed_store(path: &Path, order: ByteOrder, payloads: &[&[u8]]) -> (RecordStore, Vec<RecordRef>) {
        let store = RecordStore::create(path, order).unwrap();
        let refs = payloads.iter().map(|p| store.append(p).unwrap()).collect();
        store.seal().unwrap();
        (store, refs)
    }

    #[test]
    fn test_append_assigns_consecutive_offsets() {
        let dir = tempdir().unwrap();
        let store = RecordStore::create(dir.path().join("data.rec"), ByteOrder::Big).unwrap();

        let a = store.append(b"hello").unwrap();
        let b = store.append(b"").unwrap();
        let c = store.append(b"world!").unwrap();

        assert_eq!(a, RecordRef::new(0, 5));
        assert_eq!(b, RecordRef::new(9, 0));
        assert_eq!(c, RecordRef::new(13, 6));
        assert_eq!(store.len_bytes().unwrap(), 23);
        assert_eq!(store.record_count().unwrap(), 3);
        assert_eq!(store.mode(), StoreMode::Append);
    }

    #[test]
    fn test_on_disk_layout() {
        let dir = tempdir().unwrap();
        let big = dir.path().join("big.rec");
        let little = dir.path().join("little.rec");
        sealed_store(&big, ByteOrder::Big, &[b"ab"]);
        sealed_store(&little, ByteOrder::Little, &[b"ab"]);

        assert_eq!(std::fs::read(&big).unwrap(), vec![0, 0, 0, 2, b'a', b'b']);
        assert_eq!(std::fs::read(&little).unwrap(), vec![2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_existing_store_replaced_only_on_seal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.rec");
        let (old, refs) = sealed_store(&path, ByteOrder::Big, &[b"old"]);
        let old_bytes = std::fs::read(&path).unwrap();

        let new = RecordStore::create(&path, ByteOrder::Big).unwrap();
        new.append(b"replacement").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), old_bytes);
        assert_eq!(old.read(refs[0]).unwrap(), b"old");

        new.seal().unwrap();
        assert_eq!(new.record_count().unwrap(), 1);
        assert_eq!(std::fs::read(&path).unwrap().len(), 4 + 11);
        // the old handle still sees the file it opened
        assert_eq!(old.read(refs[0]).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_dropped_append_handle_discards_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.rec");
        sealed_store(&path, ByteOrder::Little, &[b"keep", b"me"]);
        let old_bytes = std::fs::read(&path).unwrap();

        let abandoned = RecordStore::create(&path, ByteOrder::Little).unwrap();
        abandoned.append(b"lost").unwrap();
        drop(abandoned);

        assert_eq!(std::fs::read(&path).unwrap(), old_bytes);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let fresh = dir.path().join("fresh.rec");
        drop(RecordStore::create(&fresh, ByteOrder::Little).unwrap());
        assert!(!fresh.exists());
    }

    #[test]
    fn test_unaddressable_reference_is_an_error() {
        let dir = tempdir().unwrap();
        let (store, _) = sealed_store(&dir.path().join("data.rec"), ByteOrder::Big, &[b"abcd"]);

        assert!(matches!(
            store.read(RecordRef::new(u64::MAX, 4)),
            Err(SpatialError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.read_length_prefix(u64::MAX - 1),
            Err(SpatialError::TruncatedRecord { .. })
        ));
    }

    #[test]
    fn test_read_after_seal() {
        let dir = tempdir().unwrap();
        let (store, refs) = sealed_store(
            &dir.path().join("data.rec"),
            ByteOrder::Little,
            &[b"one", b"two", b"three"],
        );

        assert_eq!(store.mode(), StoreMode::ReadOnly);
        assert_eq!(store.read(refs[2]).unwrap(), b"three");
        assert_eq!(store.read(refs[0]).unwrap(), b"one");
        assert_eq!(store.records_read(), 2);
        assert_eq!(store.bytes_read(), 8);
    }

    #[test]
    fn test_append_on_read_only_store_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.rec");
        sealed_store(&path, ByteOrder::Big, &[b"x"]);

        let store = RecordStore::open(&path, ByteOrder::Big).unwrap();
        assert!(matches!(
            store.append(b"y"),
            Err(SpatialError::ReadOnlyViolation(_))
        ));

        store.seal().unwrap();
        assert!(matches!(store.append(b"y"), Err(SpatialError::ReadOnlyViolation(_))));
    }

    #[test]
    fn test_read_in_append_mode_fails() {
        let dir = tempdir().unwrap();
        let store = RecordStore::create(dir.path().join("data.rec"), ByteOrder::Big).unwrap();
        let r = store.append(b"abc").unwrap();
        assert!(matches!(store.read(r), Err(SpatialError::InvalidState(_))));
        assert!(store.iterate().next().unwrap().is_err());
    }

    #[test]
    fn test_closed_store() {
        let dir = tempdir().unwrap();
        let store = RecordStore::create(dir.path().join("data.rec"), ByteOrder::Big).unwrap();
        store.append(b"abc").unwrap();
        store.close().unwrap();
        store.close().unwrap();

        assert_eq!(store.mode(), StoreMode::Closed);
        assert!(matches!(store.append(b"x"), Err(SpatialError::InvalidState(_))));
        assert!(matches!(store.seal(), Err(SpatialError::InvalidState(_))));
    }

    #[test]
    fn test_iterate_is_restartable() {
        let dir = tempdir().unwrap();
        let (store, refs) = sealed_store(
            &dir.path().join("data.rec"),
            ByteOrder::Big,
            &[b"a", b"bb", b"ccc"],
        );

        for _ in 0..2 {
            let records: Vec<_> = store.iterate().map(|r| r.unwrap()).collect();
            assert_eq!(records.len(), 3);
            assert_eq!(records[0], (refs[0], b"a".to_vec()));
            assert_eq!(records[1], (refs[1], b"bb".to_vec()));
            assert_eq!(records[2], (refs[2], b"ccc".to_vec()));
        }
    }

    #[test]
    fn test_iterate_empty_store() {
        let dir = tempdir().unwrap();
        let (store, _) = sealed_store(&dir.path().join("data.rec"), ByteOrder::Big, &[]);
        assert_eq!(store.iterate().count(), 0);
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn test_truncated_tail_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.rec");
        sealed_store(&path, ByteOrder::Big, &[b"complete", b"partial"]);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let store = RecordStore::open(&path, ByteOrder::Big).unwrap();
        let items: Vec<_> = store.iterate().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(SpatialError::TruncatedRecord { .. })));
        assert!(store.record_count().is_err());
    }

    #[test]
    fn test_read_past_end_and_length_mismatch() {
        let dir = tempdir().unwrap();
        let (store, refs) = sealed_store(&dir.path().join("data.rec"), ByteOrder::Big, &[b"abcd"]);

        assert!(matches!(
            store.read(RecordRef::new(0, 100)),
            Err(SpatialError::TruncatedRecord { .. })
        ));
        assert!(matches!(
            store.read(RecordRef::new(refs[0].offset, 2)),
            Err(SpatialError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_concurrent_reads() {
        let dir = tempdir().unwrap();
        let payloads: Vec<Vec<u8>> = (0..200u32).map(|i| i.to_be_bytes().repeat(3)).collect();
        let slices: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let (store, refs) = sealed_store(&dir.path().join("data.rec"), ByteOrder::Little, &slices);
        let store = std::sync::Arc::new(store);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                let refs = refs.clone();
                let payloads = payloads.clone();
                std::thread::spawn(move || {
                    for (i, r) in refs.iter().enumerate().skip(t).step_by(4) {
                        assert_eq!(store.read(*r).unwrap(), payloads[i]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.records_read(), 200);
    }
}
