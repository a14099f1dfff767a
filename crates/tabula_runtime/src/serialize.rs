//! Session snapshot persistence using MessagePack.
//!
//! Only inputs are saved: source tables, rule declarations, and the last
//! change version. Outputs, provenance, and links are derived and are
//! rebuilt by evaluating the restored session.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tabula_engine::RuleDecl;
use tabula_foundation::{Error, ErrorKind, Result};
use tabula_storage::Table;

/// The persistent part of a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Source tables in id order.
    pub tables: Vec<Table>,
    /// Rule declarations in id order, creation numbers filled in.
    pub rules: Vec<RuleDecl>,
    /// Last change version applied.
    #[serde(default)]
    pub version: Option<u64>,
}

/// Serializes state to `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_bytes(state: &SessionState) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(state).map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
}

/// Deserializes state from `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid snapshot.
pub fn from_bytes(bytes: &[u8]) -> Result<SessionState> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
}

/// Saves state to a file.
///
/// # Errors
///
/// Returns an error if serialization or file I/O fails.
pub fn save_to_file<P: AsRef<Path>>(state: &SessionState, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(state)?;

    let file = File::create(path).map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to create file '{}': {e}",
            path.display()
        )))
    })?;

    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes).map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to write file '{}': {e}",
            path.display()
        )))
    })?;
    writer.flush().map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to flush file '{}': {e}",
            path.display()
        )))
    })?;

    Ok(())
}

/// Loads state from a file.
///
/// # Errors
///
/// Returns an error if file I/O or deserialization fails.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<SessionState> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to open file '{}': {e}",
            path.display()
        )))
    })?;

    let mut bytes = Vec::new();
    BufReader::new(file).read_to_end(&mut bytes).map_err(|e| {
        Error::new(ErrorKind::IoError(format!(
            "failed to read file '{}': {e}",
            path.display()
        )))
    })?;

    from_bytes(&bytes)
}
