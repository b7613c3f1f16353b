//! Sample archiving.
//!
//! Captured and generated bursts are persisted for offline inspection,
//! either as one signed decimal per line (easy to plot) or as raw
//! little-endian 16-bit values (easy to reload). An artifact always
//! reflects exactly the most recent call for its name: any pre-existing
//! file is removed before writing, never appended to.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DaqError, Result};

/// Artifact encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// One signed decimal integer per line.
    Ascii,
    /// Raw little-endian `i16` values.
    Binary,
}

/// Write a sample buffer to `path`, replacing any previous artifact.
///
/// # Errors
///
/// Returns [`DaqError::Archive`] if the artifact cannot be removed,
/// created, or written.
pub fn archive(samples: &[i16], path: &Path, encoding: Encoding) -> Result<()> {
    // Idempotent replacement: the artifact never accumulates history.
    remove_if_exists(path)?;

    let file = File::create(path).map_err(|e| DaqError::archive(path, e))?;
    let mut out = BufWriter::new(file);

    match encoding {
        Encoding::Ascii => {
            for sample in samples {
                writeln!(out, "{sample}").map_err(|e| DaqError::archive(path, e))?;
            }
        }
        Encoding::Binary => {
            for sample in samples {
                out.write_all(&sample.to_le_bytes())
                    .map_err(|e| DaqError::archive(path, e))?;
            }
        }
    }

    out.flush().map_err(|e| DaqError::archive(path, e))?;
    debug!("archived {} samples to {}", samples.len(), path.display());
    Ok(())
}

/// Write the `<stem>.txt` / `<stem>.bin` artifact pair into `dir`.
///
/// # Errors
///
/// Returns [`DaqError::Archive`] if either artifact cannot be written.
pub fn archive_pair(samples: &[i16], dir: &Path, stem: &str) -> Result<(PathBuf, PathBuf)> {
    let ascii = dir.join(format!("{stem}.txt"));
    let binary = dir.join(format!("{stem}.bin"));
    archive(samples, &ascii, Encoding::Ascii)?;
    archive(samples, &binary, Encoding::Binary)?;
    Ok((ascii, binary))
}

/// Load a binary artifact back into samples.
///
/// # Errors
///
/// Returns [`DaqError::Archive`] if the file cannot be read, or
/// [`DaqError::Protocol`] if its length is not sample aligned.
pub fn load_binary(path: &Path) -> Result<Vec<i16>> {
    let raw = fs::read(path).map_err(|e| DaqError::archive(path, e))?;
    if raw.len() % 2 != 0 {
        return Err(DaqError::protocol(format!(
            "{} holds {} bytes, not 16-bit aligned",
            path.display(),
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DaqError::archive(path, e)),
    }
}
