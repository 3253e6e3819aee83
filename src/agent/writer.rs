//! Change detection against the destination file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::agent::render::RenderedArtifact;
use crate::hash::ContentHash;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of comparing a render with the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Rendered bytes were written to the staging path.
    Changed,
    /// Destination already holds the rendered bytes; nothing was written.
    Unchanged,
}

/// Stage `artifact` unless `dest` already holds it.
///
/// Never touches `dest` unless it is also the staging path.
pub async fn reconcile(
    dest: &Path,
    staging: &Path,
    artifact: &RenderedArtifact,
) -> Result<Reconcile, WriteError> {
    match fs::read(dest).await {
        Ok(existing) => {
            if ContentHash::of(&existing) == artifact.hash {
                return Ok(Reconcile::Unchanged);
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(WriteError::Read {
                path: dest.to_path_buf(),
                source,
            })
        }
    }

    write_staging(staging, &artifact.bytes).await?;
    Ok(Reconcile::Changed)
}

async fn write_staging(staging: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let wrap = |source| WriteError::Write {
        path: staging.to_path_buf(),
        source,
    };

    if let Some(parent) = staging.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(wrap)?;
    }
    fs::write(staging, bytes).await.map_err(wrap)
}
