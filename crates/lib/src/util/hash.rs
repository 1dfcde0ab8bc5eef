//! Artifact hashing.
//!
//! Every file a builder leaves in its output directory is recorded with its
//! size and full SHA-256 digest, in sorted path order.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A full 64-character SHA-256 hash, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// One file produced by a builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  /// Path relative to the target's output directory.
  pub path: PathBuf,
  pub size: u64,
  pub sha256: ContentHash,
}

/// Hash a single file.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let read = file.read(&mut buffer)?;
    if read == 0 {
      break;
    }
    hasher.update(&buffer[..read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// List every regular file under `dir`, sorted by path.
///
/// Symlinks are not followed. A missing directory yields an empty list.
pub fn collect_artifacts(dir: &Path) -> io::Result<Vec<Artifact>> {
  if !dir.exists() {
    return Ok(Vec::new());
  }

  let mut artifacts = Vec::new();
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    if !entry.file_type().is_file() {
      continue;
    }

    let relative = entry.path().strip_prefix(dir).map_err(io::Error::other)?.to_path_buf();
    artifacts.push(Artifact {
      path: relative,
      size: entry.metadata().map_err(io::Error::other)?.len(),
      sha256: hash_file(entry.path())?,
    });
  }

  Ok(artifacts)
}
