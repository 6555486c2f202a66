//! JSON model format built on `serde_json`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BytepairError, Result};
use crate::model::{BpeModel, Grammar, TokenId};
use crate::serialization::FORMAT_VERSION;

#[derive(Serialize, Deserialize)]
struct ModelFile {
    version: u32,
    iterations: u64,
    tokens: Vec<TokenId>,
    grammar: Grammar,
}

/// Serialises a model to a JSON string.
pub fn to_json(model: &BpeModel, pretty: bool) -> Result<String> {
    let file = ModelFile {
        version: FORMAT_VERSION,
        iterations: model.iterations(),
        tokens: model.tokens().to_vec(),
        grammar: model.grammar().clone(),
    };
    let text = if pretty {
        serde_json::to_string_pretty(&file)?
    } else {
        serde_json::to_string(&file)?
    };
    Ok(text)
}

/// Parses a model from a JSON string, validating its structure.
pub fn from_json(text: &str) -> Result<BpeModel> {
    let file: ModelFile = serde_json::from_str(text)?;
    if file.version != FORMAT_VERSION {
        return Err(BytepairError::Serialization(format!(
            "unsupported format version {}, expected {FORMAT_VERSION}",
            file.version
        )));
    }
    BpeModel::new(file.grammar, file.tokens, file.iterations)
}

/// Writes a model to `path` as JSON.
pub fn save_json<P: AsRef<Path>>(model: &BpeModel, path: P, pretty: bool) -> Result<()> {
    let json = to_json(model, pretty)?;
    let path = path.as_ref();
    fs::write(path, json).map_err(|err| BytepairError::io(err, Some(path.to_path_buf())))
}

/// Reads a JSON model from `path`.
pub fn load_json<P: AsRef<Path>>(path: P) -> Result<BpeModel> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|err| BytepairError::io(err, Some(path.to_path_buf())))?;
    from_json(&text)
}
