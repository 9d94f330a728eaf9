//! File-backed assignment store — binary protobuf frames.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Rules:
//!   - The whole table set is rewritten on every mutation
//!   - Writes go to `<path>.tmp`, are fsynced, then renamed over `<path>`
//!   - The parent directory is fsynced after the rename (unix)
//!   - The in-memory tables change only after the rename succeeded
//!   - A trailing SHA-256 over every preceding frame detects corruption

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use prost::Message;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use geo_partition_engine::invariants::{try_validate_activation, try_validate_distribution};
use geo_partition_engine::{Assignment, Distribution, DistributionId};

use crate::proto_bridge::{proto_to_record, record_to_proto};
use crate::proto_types::{
    ProtoDistributionRecord, ProtoStoreHeader, ProtoStoreTrailer, STORE_FORMAT_VERSION,
};
use crate::store::{AssignmentStore, StoreError, StoreTables};

const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Assignment store persisted to a single binary file.
pub struct FileStore {
    path: PathBuf,
    tables: Mutex<StoreTables>,
}

impl FileStore {
    /// Open or create a store at the given path.
    /// An existing file is read and verified in full.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tables = if path.exists() {
            read_tables(path)?
        } else {
            StoreTables::default()
        };
        info!(
            path = %path.display(),
            distributions = tables.records.len(),
            "assignment store opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            tables: Mutex::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreTables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Apply `change` to a copy of the tables, persist the copy, then
    /// publish it. Nothing is published if either step fails.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut StoreTables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        let out = change(&mut next)?;
        write_tables(&self.path, &next)?;
        *guard = next;
        Ok(out)
    }
}

impl AssignmentStore for FileStore {
    fn next_distribution_id(&self) -> Result<DistributionId, StoreError> {
        self.mutate(|t| Ok(t.allocate_id()))
    }

    fn save_new(
        &self,
        distribution: &Distribution,
        assignments: &[Assignment],
    ) -> Result<(), StoreError> {
        self.mutate(|t| t.insert(distribution, assignments))
    }

    fn load(&self, id: DistributionId) -> Result<Distribution, StoreError> {
        Ok(self.lock()?.get(id)?.distribution.clone())
    }

    fn load_items(&self, id: DistributionId) -> Result<Vec<Assignment>, StoreError> {
        Ok(self.lock()?.get(id)?.assignments.clone())
    }

    fn list(&self) -> Result<Vec<Distribution>, StoreError> {
        Ok(self.lock()?.headers())
    }

    fn replace_items(
        &self,
        distribution: &Distribution,
        assignments: &[Assignment],
    ) -> Result<(), StoreError> {
        self.mutate(|t| t.replace(distribution, assignments))
    }

    fn delete_distribution(&self, id: DistributionId) -> Result<(), StoreError> {
        self.mutate(|t| t.remove(id))
    }

    fn delete_items_where(
        &self,
        id: DistributionId,
        predicate: &dyn Fn(&Assignment) -> bool,
    ) -> Result<(Distribution, usize), StoreError> {
        self.mutate(|t| t.remove_items_where(id, predicate))
    }

    fn set_active_flags(&self, flags: &[(DistributionId, bool)]) -> Result<(), StoreError> {
        self.mutate(|t| t.apply_active_flags(flags))
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn write_tables(path: &Path, tables: &StoreTables) -> Result<(), StoreError> {
    let mut body = Vec::new();
    push_frame(
        &mut body,
        &ProtoStoreHeader {
            format_version: STORE_FORMAT_VERSION,
            next_distribution_id: tables.next_id,
            distribution_count: tables.records.len() as u64,
        }
        .encode_to_vec(),
    );
    for record in tables.records.values() {
        push_frame(&mut body, &record_to_proto(record).encode_to_vec());
    }
    let trailer = ProtoStoreTrailer {
        sha256: Sha256::digest(&body).to_vec(),
    };
    push_frame(&mut body, &trailer.encode_to_vec());

    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        {
            let mut writer = BufWriter::new(&mut file);
            writer.write_all(&body)?;
            writer.flush()?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_dir(parent_dir(path))?;

    debug!(
        path = %path.display(),
        bytes = body.len(),
        distributions = tables.records.len(),
        "assignment store written"
    );
    Ok(())
}

/// Directory holding `path`; `.` for a bare file name.
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Make a rename inside `dir` durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn push_frame(out: &mut Vec<u8>, frame: &[u8]) {
    out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    out.extend_from_slice(frame);
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Read and verify a store file: frame integrity, checksum, record shape
/// and header/row consistency.
fn read_tables(path: &Path) -> Result<StoreTables, StoreError> {
    let frames = read_frames(path)?;
    let Some((trailer_frame, record_frames)) = frames.split_last() else {
        return Err(corrupt("store file is empty"));
    };
    let Some((header_frame, record_frames)) = record_frames.split_first() else {
        return Err(corrupt("store file has no header"));
    };

    let mut hasher = Sha256::new();
    for frame in std::iter::once(header_frame).chain(record_frames) {
        hasher.update((frame.len() as u32).to_le_bytes());
        hasher.update(frame);
    }
    let trailer = decode::<ProtoStoreTrailer>(trailer_frame)?;
    if trailer.sha256.as_slice() != hasher.finalize().as_slice() {
        return Err(corrupt("store checksum mismatch"));
    }

    let header = decode::<ProtoStoreHeader>(header_frame)?;
    if header.format_version != STORE_FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported store format version {}",
            header.format_version
        )));
    }
    if header.distribution_count != record_frames.len() as u64 {
        return Err(corrupt(format!(
            "header announces {} distributions, file holds {}",
            header.distribution_count,
            record_frames.len()
        )));
    }

    let mut tables = StoreTables {
        next_id: header.next_distribution_id.max(1),
        records: Default::default(),
    };
    for frame in record_frames {
        let record = proto_to_record(&decode::<ProtoDistributionRecord>(frame)?)?;
        try_validate_distribution(&record.distribution, &record.assignments)
            .map_err(|e| corrupt(e.to_string()))?;
        let id = record.distribution.id;
        if id.0 >= tables.next_id {
            return Err(corrupt(format!(
                "distribution {} is not below the next id {}",
                id, tables.next_id
            )));
        }
        if tables.records.insert(id, record).is_some() {
            return Err(corrupt(format!("distribution {} stored twice", id)));
        }
    }
    try_validate_activation(&tables.headers()).map_err(|e| corrupt(e.to_string()))?;
    Ok(tables)
}

fn read_frames(path: &Path) -> Result<Vec<Vec<u8>>, StoreError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut frames = Vec::new();
    let mut len_buf = [0u8; 4];

    loop {
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(corrupt(format!("invalid frame length: {}", len)));
        }

        let mut frame = vec![0u8; len];
        reader
            .read_exact(&mut frame)
            .map_err(|e| corrupt(format!("truncated frame: {}", e)))?;
        frames.push(frame);
    }

    Ok(frames)
}

fn decode<M: Message + Default>(frame: &[u8]) -> Result<M, StoreError> {
    M::decode(frame).map_err(|e| corrupt(format!("protobuf decode error: {}", e)))
}

fn corrupt(msg: impl Into<String>) -> StoreError {
    StoreError::Corrupt(msg.into())
}
