//! Versioned binary sections and atomic file writes

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};

/// Current layout version of numeric array files
pub const ARRAY_SECTION_VERSION: u32 = 1;

const ARRAY_SECTION_KIND: &str = "array";

/// One independently versioned payload inside an artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// What the payload holds, e.g. `"preprocessor"`
    pub kind: String,
    /// Layout version of the payload
    pub version: u32,
    pub payload: Vec<u8>,
    /// FNV-1a hash of `payload`
    pub checksum: u64,
}

impl Section {
    /// Serialize `value` into a section
    pub fn encode<T: Serialize>(kind: &str, version: u32, value: &T) -> Result<Self> {
        let payload = bincode::serialize(value).map_err(|e| {
            PipelineError::SerializationError(format!("Failed to serialize {}: {}", kind, e))
        })?;
        let checksum = fnv1a(&payload);
        Ok(Self {
            kind: kind.to_string(),
            version,
            payload,
            checksum,
        })
    }

    /// Deserialize the payload after checking kind, version and checksum
    pub fn decode<T: DeserializeOwned>(&self, kind: &str, version: u32) -> Result<T> {
        if self.kind != kind {
            return Err(PipelineError::SerializationError(format!(
                "Expected a {} section, found {}",
                kind, self.kind
            )));
        }
        if self.version != version {
            return Err(PipelineError::SerializationError(format!(
                "Unsupported {} section version {} (expected {})",
                kind, self.version, version
            )));
        }
        if fnv1a(&self.payload) != self.checksum {
            return Err(PipelineError::SerializationError(format!(
                "Checksum verification failed for {} section - file may be corrupted",
                kind
            )));
        }
        bincode::deserialize(&self.payload).map_err(|e| {
            PipelineError::SerializationError(format!("Failed to deserialize {}: {}", kind, e))
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactFile {
    magic: [u8; 4],
    format_version: u32,
    sections: Vec<Section>,
}

impl ArtifactFile {
    const MAGIC: [u8; 4] = [b'N', b'S', b'P', b'A'];
    const VERSION: u32 = 1;
}

/// FNV-1a hash
fn fnv1a(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Write a file atomically.
///
/// The content is written to a temporary file in the destination directory,
/// flushed and synced, then renamed over `path`. If `write` fails the temporary
/// file is removed and `path` is left untouched. Missing parent directories
/// are created.
pub fn atomic_write<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PipelineError::IoError(e.error))?;
    Ok(())
}

/// Persist sections as one artifact file
pub fn save_sections(path: &Path, sections: Vec<Section>) -> Result<()> {
    let file = ArtifactFile {
        magic: ArtifactFile::MAGIC,
        format_version: ArtifactFile::VERSION,
        sections,
    };
    atomic_write(path, |writer| {
        bincode::serialize_into(writer, &file)?;
        Ok(())
    })
}

/// Load every section of an artifact file
pub fn load_sections(path: &Path) -> Result<Vec<Section>> {
    let file = File::open(path).map_err(|e| {
        PipelineError::DataError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let mut bytes = Vec::new();
    BufReader::new(file).read_to_end(&mut bytes)?;

    let artifact: ArtifactFile = bincode::deserialize(&bytes).map_err(|e| {
        PipelineError::SerializationError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    if artifact.magic != ArtifactFile::MAGIC {
        return Err(PipelineError::SerializationError(format!(
            "{} is not a pipeline artifact",
            path.display()
        )));
    }
    if artifact.format_version != ArtifactFile::VERSION {
        return Err(PipelineError::SerializationError(format!(
            "Unsupported artifact format version {} in {}",
            artifact.format_version,
            path.display()
        )));
    }
    Ok(artifact.sections)
}

/// Persist a single object
pub fn save_object<T: Serialize>(path: &Path, kind: &str, version: u32, value: &T) -> Result<()> {
    save_sections(path, vec![Section::encode(kind, version, value)?])
}

/// Load a single object written by [`save_object`]
pub fn load_object<T: DeserializeOwned>(path: &Path, kind: &str, version: u32) -> Result<T> {
    let sections = load_sections(path)?;
    let section = sections.iter().find(|s| s.kind == kind).ok_or_else(|| {
        PipelineError::SerializationError(format!("No {} section in {}", kind, path.display()))
    })?;
    section.decode(kind, version)
}

/// Persist a numeric array
pub fn save_array(path: &Path, array: &Array2<f64>) -> Result<()> {
    save_object(path, ARRAY_SECTION_KIND, ARRAY_SECTION_VERSION, array)
}

/// Load a numeric array written by [`save_array`]
pub fn load_array(path: &Path) -> Result<Array2<f64>> {
    load_object(path, ARRAY_SECTION_KIND, ARRAY_SECTION_VERSION)
}
