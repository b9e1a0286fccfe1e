/*!
Format layer: turns a [`Container`] into bytes and back.

The snapshot codec only ever produces one of two [`Encoding`]s. The
[`SnapshotFormat::CompressedBinary`] format is the binary encoding passed through
a [`CompressionAdapter`], so decompressing a compressed snapshot yields exactly
the bytes of the uncompressed binary snapshot.

Binary layout: `[MAGIC_BYTES] [MessagePack document]`. Text layout: a pretty
printed JSON document.
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::compression::CompressionAdapter;
use crate::container::Container;
use crate::{Result, SnapshotError};

/// Magic bytes opening every binary snapshot: "SNPG".
pub const MAGIC_BYTES: [u8; 4] = *b"SNPG";

/// File extension used by the binary formats.
pub const BINARY_EXTENSION: &str = "bin";
/// File extension used by the text format.
pub const TEXT_EXTENSION: &str = "json";

/// Format identifier chosen by the caller of save/load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    #[default]
    Binary,
    Text,
    CompressedBinary,
}

impl SnapshotFormat {
    /// The encoding the codec emits for this format.
    pub fn encoding(self) -> Encoding {
        match self {
            SnapshotFormat::Text => Encoding::Text,
            SnapshotFormat::Binary | SnapshotFormat::CompressedBinary => Encoding::Binary,
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, SnapshotFormat::CompressedBinary)
    }

    /// Default file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            SnapshotFormat::Text => TEXT_EXTENSION,
            SnapshotFormat::Binary | SnapshotFormat::CompressedBinary => BINARY_EXTENSION,
        }
    }

    /// Encode `container`, compressing the result when the format asks for it.
    pub fn encode(self, container: &Container, compressor: &dyn CompressionAdapter) -> Result<Vec<u8>> {
        let bytes = self.encoding().encode(container)?;
        if self.is_compressed() {
            compressor.compress(&bytes)
        } else {
            Ok(bytes)
        }
    }

    /// Decode bytes produced by [`SnapshotFormat::encode`].
    pub fn decode(self, bytes: &[u8], compressor: &dyn CompressionAdapter) -> Result<Container> {
        if self.is_compressed() {
            let raw = compressor.decompress(bytes)?;
            self.encoding().decode(&raw)
        } else {
            self.encoding().decode(bytes)
        }
    }
}

impl fmt::Display for SnapshotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotFormat::Binary => "binary",
            SnapshotFormat::Text => "text",
            SnapshotFormat::CompressedBinary => "compressed",
        };
        f.write_str(name)
    }
}

impl FromStr for SnapshotFormat {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "bin" => Ok(SnapshotFormat::Binary),
            "text" | "json" => Ok(SnapshotFormat::Text),
            "compressed" | "compressed_binary" | "gz" => Ok(SnapshotFormat::CompressedBinary),
            other => Err(SnapshotError::validation(format!(
                "unknown snapshot format '{other}' (expected binary, text or compressed)"
            ))),
        }
    }
}

/// Wire encoding of a container, recorded inside the container itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Binary,
    Text,
}

impl Encoding {
    pub fn encode(self, container: &Container) -> Result<Vec<u8>> {
        if container.encoding != self {
            return Err(SnapshotError::validation(format!(
                "container is tagged {:?} but was asked to encode as {:?}",
                container.encoding, self
            )));
        }

        match self {
            Encoding::Binary => {
                let mut bytes = MAGIC_BYTES.to_vec();
                rmp_serde::encode::write_named(&mut bytes, container)?;
                Ok(bytes)
            }
            Encoding::Text => Ok(serde_json::to_vec_pretty(container)?),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<Container> {
        let container: Container = match self {
            Encoding::Binary => {
                let body = bytes.strip_prefix(&MAGIC_BYTES[..]).ok_or_else(|| {
                    SnapshotError::invalid_format("missing binary snapshot magic bytes")
                })?;
                rmp_serde::from_slice(body)?
            }
            Encoding::Text => serde_json::from_slice(bytes)?,
        };

        if container.encoding != self {
            return Err(SnapshotError::invalid_format(format!(
                "snapshot is tagged {:?} but was read as {:?}",
                container.encoding, self
            )));
        }
        Ok(container)
    }
}
