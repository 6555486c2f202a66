//! Compact binary model format.
//!
//! All integers are little-endian:
//!
//! | field | type |
//! | --- | --- |
//! | magic `b"BPE\0"` | 4 bytes |
//! | format version | `u32` |
//! | iterations | `u64` |
//! | token count `n` | `u64` |
//! | tokens | `n × u32` |
//! | rule count `m` | `u64` |
//! | rules | `m × (u32 left, u32 right)` |

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{BytepairError, Result};
use crate::model::{BpeModel, Grammar, Pair, TokenId};

/// File signature of the binary format.
pub const MAGIC: [u8; 4] = *b"BPE\0";
/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;

const TOKEN_WIDTH: usize = std::mem::size_of::<TokenId>();

/// Encodes a model into the binary format.
#[must_use]
pub fn to_bytes(model: &BpeModel) -> Vec<u8> {
    let tokens = model.tokens();
    let rules = model.grammar().rules();
    let mut out = Vec::with_capacity(28 + TOKEN_WIDTH * (tokens.len() + 2 * rules.len()));
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&model.iterations().to_le_bytes());
    out.extend_from_slice(&(tokens.len() as u64).to_le_bytes());
    for token in tokens {
        out.extend_from_slice(&token.to_le_bytes());
    }
    out.extend_from_slice(&(rules.len() as u64).to_le_bytes());
    for rule in rules {
        out.extend_from_slice(&rule.left.to_le_bytes());
        out.extend_from_slice(&rule.right.to_le_bytes());
    }
    out
}

/// Decodes a model from the binary format, validating its structure.
pub fn from_bytes(data: &[u8]) -> Result<BpeModel> {
    let mut reader = Reader { data, offset: 0 };
    if reader.take(MAGIC.len())? != MAGIC {
        return Err(BytepairError::Serialization("missing BPE file signature".into()));
    }
    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(BytepairError::Serialization(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let iterations = reader.u64()?;

    let token_count = reader.count(TOKEN_WIDTH)?;
    let tokens = (0..token_count)
        .map(|_| reader.u32())
        .collect::<Result<Vec<TokenId>>>()?;

    let rule_count = reader.count(2 * TOKEN_WIDTH)?;
    let rules = (0..rule_count)
        .map(|_| -> Result<Pair> { Ok(Pair::new(reader.u32()?, reader.u32()?)) })
        .collect::<Result<Vec<Pair>>>()?;

    if reader.offset != data.len() {
        return Err(BytepairError::Serialization(format!(
            "{} trailing bytes after grammar",
            data.len() - reader.offset
        )));
    }
    let grammar = Grammar::from_rules(rules)?;
    BpeModel::new(grammar, tokens, iterations)
}

/// Writes a model to `path` in the binary format.
pub fn save_binary<P: AsRef<Path>>(model: &BpeModel, path: P) -> Result<()> {
    let path = path.as_ref();
    let io_err = |err| BytepairError::io(err, Some(path.to_path_buf()));
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&to_bytes(model)).map_err(io_err)?;
    writer.flush().map_err(io_err)
}

/// Reads a binary model from `path`.
pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<BpeModel> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|err| BytepairError::io(err, Some(path.to_path_buf())))?;
    from_bytes(&data)
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                BytepairError::Serialization(format!(
                    "unexpected end of data at byte {} (wanted {len} more)",
                    self.offset
                ))
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a length prefix and checks the remaining data can hold that many records.
    fn count(&mut self, record_width: usize) -> Result<usize> {
        let count = self.u64()?;
        let remaining = (self.data.len() - self.offset) / record_width;
        usize::try_from(count)
            .ok()
            .filter(|&count| count <= remaining)
            .ok_or_else(|| {
                BytepairError::Serialization(format!(
                    "length prefix {count} exceeds the {remaining} records left in the data"
                ))
            })
    }
}
