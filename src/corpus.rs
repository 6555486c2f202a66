//! Loading training input from disk.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{BytepairError, Result};

/// Reads the whole file at `path` into memory.
///
/// Any byte value is valid input and an empty file is accepted; training on it converges
/// immediately.
pub fn load_input<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let metadata = path
        .metadata()
        .map_err(|err| BytepairError::io(err, Some(path.to_path_buf())))?;
    if !metadata.is_file() {
        return Err(BytepairError::InvalidConfig(format!(
            "input path {path:?} is not a regular file"
        )));
    }
    let mut file =
        File::open(path).map_err(|err| BytepairError::io(err, Some(path.to_path_buf())))?;
    let mut buffer = Vec::with_capacity(usize::try_from(metadata.len()).unwrap_or(0));
    file.read_to_end(&mut buffer)
        .map_err(|err| BytepairError::io(err, Some(path.to_path_buf())))?;
    Ok(buffer)
}
