//! Helpers for persisting trained models.
//!
//! Two formats are supported: a compact little-endian binary layout (`.bpe`) and JSON.
//! [`load_model`] detects the format from the file contents.

pub mod binary;
pub mod json;

use std::fs;
use std::path::Path;

use crate::error::{BytepairError, Result};
use crate::model::BpeModel;

pub use binary::{from_bytes, load_binary, save_binary, to_bytes, FORMAT_VERSION, MAGIC};
pub use json::{from_json, load_json, save_json, to_json};

/// Loads a model written in either supported format.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<BpeModel> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|err| BytepairError::io(err, Some(path.to_path_buf())))?;
    if data.starts_with(&MAGIC) {
        from_bytes(&data)
    } else {
        let text = std::str::from_utf8(&data).map_err(|err| {
            BytepairError::Serialization(format!(
                "{} is neither .bpe nor JSON: {err}",
                path.display()
            ))
        })?;
        from_json(text)
    }
}
