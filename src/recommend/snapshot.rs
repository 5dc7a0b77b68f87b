//! Snapshot persistence: the index + item-table artifact pair.
//!
//! A snapshot is two files, always written and loaded together:
//!
//! `vectors.bin` — header (47 bytes) then payload:
//! - version: u8
//! - model_id: [u8; 32] (SHA-256 of the embedding model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of the preceding header bytes)
//! - payload: entry_count vectors of dimensions f32, little-endian, in
//!   ordinal order
//!
//! `items.json` — the item table as a JSON array indexed 0..N-1, same order.
//!
//! The loader refuses a pair whose counts disagree; a snapshot that cannot
//! uphold the ordinal invariant is never served.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::catalog::Movie;
use crate::recommend::index::{IndexError, SimilarityIndex};

const FORMAT_VERSION: u8 = 1;

/// version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const ITEMS_FILE: &str = "items.json";

/// An immutable, loaded catalog snapshot: item table plus similarity index
/// with matching ordinal order.
pub struct Snapshot {
    items: Vec<Movie>,
    index: SimilarityIndex,
}

impl Snapshot {
    /// Pair an item table with its index. Counts must match exactly.
    pub fn new(items: Vec<Movie>, index: SimilarityIndex) -> Result<Self, SnapshotError> {
        if items.len() != index.len() {
            return Err(SnapshotError::IndexMismatch {
                vectors: index.len(),
                items: items.len(),
            });
        }
        Ok(Self { items, index })
    }

    pub fn items(&self) -> &[Movie] {
        &self.items
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn item(&self, ordinal: usize) -> Option<&Movie> {
        self.items.get(ordinal)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid item table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid vectors file: {0}")]
    InvalidFormat(String),

    #[error("snapshot version {0} is newer than supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("snapshot was built with a different embedding model")]
    ModelMismatch,

    #[error("snapshot checksum mismatch, file may be corrupted")]
    ChecksumMismatch,

    #[error("snapshot dimension {got} does not match configured dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("snapshot holds {vectors} vectors but {items} items; refusing to serve")]
    IndexMismatch { vectors: usize, items: usize },

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Reads and writes the snapshot pair under one directory.
pub struct SnapshotStorage {
    dir: PathBuf,
}

/// Header fields of `vectors.bin`, readable without the payload.
#[derive(Debug)]
pub struct SnapshotInfo {
    pub version: u8,
    pub dimensions: usize,
    pub vector_count: usize,
    pub item_count: usize,
}

struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

impl SnapshotStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    pub fn items_path(&self) -> PathBuf {
        self.dir.join(ITEMS_FILE)
    }

    /// True when both artifacts are present.
    pub fn exists(&self) -> bool {
        self.vectors_path().exists() && self.items_path().exists()
    }

    /// Persist a snapshot. Both artifacts go to temp files first and are
    /// renamed into place, so a crash never leaves a half-written file; the
    /// load-time count check covers the window between the two renames.
    pub fn save(&self, snapshot: &Snapshot, model_id: &[u8; 32]) -> Result<(), SnapshotError> {
        std::fs::create_dir_all(&self.dir)?;

        let vectors_tmp = self.vectors_path().with_extension("bin.tmp");
        let items_tmp = self.items_path().with_extension("json.tmp");

        let result = self.write_pair(&vectors_tmp, &items_tmp, snapshot, model_id);
        if result.is_err() {
            let _ = std::fs::remove_file(&vectors_tmp);
            let _ = std::fs::remove_file(&items_tmp);
            return result;
        }

        std::fs::rename(&vectors_tmp, self.vectors_path())?;
        std::fs::rename(&items_tmp, self.items_path())?;

        log::info!(
            "saved snapshot: {} items, {} dims, at {}",
            snapshot.len(),
            snapshot.dimensions(),
            self.dir.display()
        );

        Ok(())
    }

    /// Load and validate the snapshot pair.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<Snapshot, SnapshotError> {
        let file = File::open(self.vectors_path())?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        if header.model_id != *expected_model_id {
            return Err(SnapshotError::ModelMismatch);
        }
        if header.dimensions as usize != expected_dimensions {
            return Err(SnapshotError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        let dimensions = header.dimensions as usize;
        let mut vectors = Vec::with_capacity(header.entry_count as usize);
        let mut buffer = vec![0u8; dimensions * 4];
        for _ in 0..header.entry_count {
            reader.read_exact(&mut buffer)?;
            let vector: Vec<f32> = buffer
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            vectors.push(vector);
        }

        let items: Vec<Movie> =
            serde_json::from_reader(BufReader::new(File::open(self.items_path())?))?;

        if items.len() != vectors.len() {
            return Err(SnapshotError::IndexMismatch {
                vectors: vectors.len(),
                items: items.len(),
            });
        }

        let index = SimilarityIndex::from_vectors(dimensions, vectors)?;
        let snapshot = Snapshot::new(items, index)?;

        log::info!(
            "loaded snapshot: {} items, {} dims",
            snapshot.len(),
            snapshot.dimensions()
        );

        Ok(snapshot)
    }

    /// Read the header and item count without loading vectors; used for
    /// diagnostics where no embedder is available.
    pub fn stat(&self) -> Result<SnapshotInfo, SnapshotError> {
        let file = File::open(self.vectors_path())?;
        let mut reader = BufReader::new(file);
        let header = read_header(&mut reader)?;

        let items: Vec<Movie> =
            serde_json::from_reader(BufReader::new(File::open(self.items_path())?))?;

        Ok(SnapshotInfo {
            version: header.version,
            dimensions: header.dimensions as usize,
            vector_count: header.entry_count as usize,
            item_count: items.len(),
        })
    }

    fn write_pair(
        &self,
        vectors_tmp: &Path,
        items_tmp: &Path,
        snapshot: &Snapshot,
        model_id: &[u8; 32],
    ) -> Result<(), SnapshotError> {
        let file = File::create(vectors_tmp)?;
        let mut writer = BufWriter::new(file);
        write_header(
            &mut writer,
            &Header {
                version: FORMAT_VERSION,
                model_id: *model_id,
                dimensions: snapshot.dimensions() as u16,
                entry_count: snapshot.len() as u64,
            },
        )?;
        for vector in snapshot.index().iter() {
            for &value in vector {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        let file = File::create(items_tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, snapshot.items())?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        Ok(())
    }
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), SnapshotError> {
    let mut bytes = [0u8; HEADER_SIZE];
    bytes[0] = header.version;
    bytes[1..33].copy_from_slice(&header.model_id);
    bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&bytes[0..43]);
    bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&bytes)?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, SnapshotError> {
    let mut bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut bytes).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SnapshotError::InvalidFormat("file shorter than header".to_string())
        } else {
            SnapshotError::Io(e)
        }
    })?;

    let version = bytes[0];
    if version > FORMAT_VERSION {
        return Err(SnapshotError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes([bytes[43], bytes[44], bytes[45], bytes[46]]);
    if stored_checksum != crc32fast::hash(&bytes[0..43]) {
        return Err(SnapshotError::ChecksumMismatch);
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&bytes[1..33]);

    Ok(Header {
        version,
        model_id,
        dimensions: u16::from_le_bytes([bytes[33], bytes[34]]),
        entry_count: u64::from_le_bytes([
            bytes[35], bytes[36], bytes[37], bytes[38], bytes[39], bytes[40], bytes[41], bytes[42],
        ]),
    })
}
