//! Ingest already-encoded media into a container
//!
//! Transcoding itself happens elsewhere; a [`MediaTranscoder`] hands back
//! named files grouped the way a player fetches them. Start files (manifest,
//! init segments) form one group, subtitles another, then each rendition is
//! its own group so its segments never share blocks with another rendition.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ciph_core::{BlockSize, CiphResult};
use tracing::info;

use crate::container::{Container, FileInput};
use crate::meta::{AudioTrack, ContainerFile, SubtitleTrack, VideoTrack};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Name inside the container
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size_bytes,
        }
    }
}

/// One quality level: its segments, in playback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub name: String,
    pub files: Vec<MediaFile>,
}

/// Output of a transcode, ready to ingest.
#[derive(Debug, Clone, Default)]
pub struct MediaPlan {
    pub start_files: Vec<MediaFile>,
    pub subtitles: Vec<MediaFile>,
    pub renditions: Vec<Rendition>,
    pub video: Vec<VideoTrack>,
    pub audio: Vec<AudioTrack>,
    pub subtitle_tracks: Vec<SubtitleTrack>,
}

#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    async fn transcode(&self, inputs: &[PathBuf]) -> CiphResult<MediaPlan>;
}

/// Block size for a group: the table entry fitting its average file size.
pub fn group_block_size(files: &[MediaFile]) -> BlockSize {
    if files.is_empty() {
        return BlockSize::MAX;
    }
    let total: u64 = files.iter().map(|f| f.size_bytes).sum();
    let avg = total / files.len() as u64;
    BlockSize::fit(avg.max(1))
        .map(|fit| fit.size)
        .unwrap_or(BlockSize::MAX)
}

fn inputs(files: &[MediaFile]) -> Vec<FileInput> {
    files
        .iter()
        .map(|f| FileInput::path(f.name.clone(), f.path.clone()))
        .collect()
}

/// Add every file of `plan` to `container` and record its track lists.
pub async fn ingest_media(
    container: &mut Container,
    plan: &MediaPlan,
) -> CiphResult<Vec<ContainerFile>> {
    let mut added = Vec::new();

    if !plan.start_files.is_empty() {
        let size = group_block_size(&plan.start_files);
        added.extend(container.add_file_group(inputs(&plan.start_files), Some(size)).await?);
    }
    if !plan.subtitles.is_empty() {
        let size = group_block_size(&plan.subtitles);
        added.extend(container.add_file_group(inputs(&plan.subtitles), Some(size)).await?);
    }
    for rendition in &plan.renditions {
        let size = group_block_size(&rendition.files);
        info!(rendition = %rendition.name, files = rendition.files.len(), size = %size, "ingesting rendition");
        added.extend(container.add_file_group(inputs(&rendition.files), Some(size)).await?);
    }

    let mut meta = container.meta().clone();
    meta.video.extend(plan.video.iter().cloned());
    meta.audio.extend(plan.audio.iter().cloned());
    meta.subtitles.extend(plan.subtitle_tracks.iter().cloned());
    container.set_meta(meta)?;

    Ok(added)
}

/// Transcode `inputs` and ingest the result.
pub async fn transcode_and_ingest<T: MediaTranscoder + ?Sized>(
    transcoder: &T,
    container: &mut Container,
    inputs: &[PathBuf],
) -> CiphResult<Vec<ContainerFile>> {
    let plan = transcoder.transcode(inputs).await?;
    ingest_media(container, &plan).await
}

/// Build a [`MediaFile`] from a file on disk, sized from its metadata.
pub async fn media_file(name: impl Into<String>, path: &Path) -> CiphResult<MediaFile> {
    let size = tokio::fs::metadata(path).await?.len();
    Ok(MediaFile::new(name, path, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciph_core::block::{KIB, MIB};

    fn files(sizes: &[u64]) -> Vec<MediaFile> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| MediaFile::new(format!("seg{i}"), format!("/tmp/seg{i}"), s))
            .collect()
    }

    #[test]
    fn test_group_size_fits_average() {
        assert_eq!(group_block_size(&files(&[900 * KIB, 1000 * KIB])), BlockSize::Mib1);
        assert_eq!(group_block_size(&files(&[10 * KIB, 12 * KIB])), BlockSize::Kib16);
    }

    #[test]
    fn test_group_size_fallbacks() {
        assert_eq!(group_block_size(&[]), BlockSize::MAX);
        assert_eq!(group_block_size(&files(&[0, 0])), BlockSize::MIN);
        assert_eq!(group_block_size(&files(&[40 * MIB])), BlockSize::MAX);
    }
}
