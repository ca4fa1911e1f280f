//! Container metadata, stored gzipped JSON inside the head block

use std::io::{Read, Write};

use ciph_core::{CiphError, CiphResult, ContentType};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};

/// One file packed into the container's data stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFile {
    pub name: String,
    /// Index of the data block holding the first byte
    pub block: u32,
    /// Byte offset of the first byte inside that block
    pub offset: u64,
    /// Byte offset inside the logical data stream
    pub stream_offset: u64,
    pub length: u64,
    /// Hex SHA-256 of the file contents
    pub digest: String,
}

/// A data block whose content ends before the block does. The rest of the
/// block is padding and not part of the data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortBlock {
    pub block: u32,
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoTrack {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bps: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bps: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMeta {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Entry point of a collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_file: Option<String>,
    /// Managed by the container; anything set here is replaced at publish.
    #[serde(default)]
    pub files: Vec<ContainerFile>,
    /// Managed by the container, like `files`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_blocks: Vec<ShortBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video: Vec<VideoTrack>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio: Vec<AudioTrack>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtitles: Vec<SubtitleTrack>,
}

impl ContainerMeta {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            title: None,
            index_file: None,
            files: Vec::new(),
            short_blocks: Vec::new(),
            video: Vec::new(),
            audio: Vec::new(),
            subtitles: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_index_file(mut self, name: impl Into<String>) -> Self {
        self.index_file = Some(name.into());
        self
    }

    /// Bytes of data stream held by block `index` of `capacity` bytes.
    pub fn block_content_len(&self, index: usize, capacity: u64) -> u64 {
        self.short_blocks
            .iter()
            .find(|s| s.block as usize == index)
            .map_or(capacity, |s| s.length.min(capacity))
    }

    /// Required fields that can only be checked once all files are known.
    pub fn validate(&self) -> CiphResult<()> {
        if self.content_type == ContentType::Collection {
            let index = self
                .index_file
                .as_deref()
                .ok_or_else(|| CiphError::MissingField("index_file".into()))?;
            if !self.files.iter().any(|f| f.name == index) {
                return Err(CiphError::MissingField(format!(
                    "index_file {index} is not in the container"
                )));
            }
        }
        Ok(())
    }

    pub fn to_compressed(&self) -> CiphResult<Vec<u8>> {
        gzip(&serde_json::to_vec(self)?)
    }

    pub fn from_compressed(data: &[u8]) -> CiphResult<Self> {
        Ok(serde_json::from_slice(&gunzip(data)?)?)
    }
}

pub fn gzip(data: &[u8]) -> CiphResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gunzip(data: &[u8]) -> CiphResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
