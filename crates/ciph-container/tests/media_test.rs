//! Integration test: media ingest from a stand-in transcoder.

mod common;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ciph_container::media::media_file;
use ciph_container::{
    transcode_and_ingest, Container, ContainerMeta, ContainerReader, MediaPlan, MediaTranscoder,
    Rendition, VideoTrack,
};
use ciph_core::block::KIB;
use ciph_core::{BlockSize, CiphError, CiphResult, ContentType};
use common::{pattern, seeded_store};
use tempfile::TempDir;

/// Writes fixed-size placeholder outputs instead of running an encoder.
struct FakeTranscoder {
    out: PathBuf,
}

impl FakeTranscoder {
    async fn write(&self, name: &str, len: usize, seed: u8) -> CiphResult<ciph_container::MediaFile> {
        let path = self.out.join(name.replace('/', "_"));
        tokio::fs::write(&path, pattern(len, seed)).await?;
        media_file(name, &path).await
    }
}

#[async_trait]
impl MediaTranscoder for FakeTranscoder {
    async fn transcode(&self, inputs: &[PathBuf]) -> CiphResult<MediaPlan> {
        if inputs.is_empty() {
            return Err(CiphError::MissingField("input".into()));
        }
        let mut segments = Vec::new();
        for i in 0..3 {
            segments.push(self.write(&format!("360p/seg{i}.m4s"), 20 * KIB as usize, i).await?);
        }
        Ok(MediaPlan {
            start_files: vec![
                self.write("manifest.mpd", KIB as usize, 10).await?,
                self.write("360p/init.mp4", 2 * KIB as usize, 11).await?,
            ],
            subtitles: vec![self.write("en.vtt", 3 * KIB as usize, 12).await?],
            renditions: vec![Rendition {
                name: "360p".into(),
                files: segments,
            }],
            video: vec![VideoTrack {
                name: "360p".into(),
                width: Some(640),
                height: Some(360),
                ..Default::default()
            }],
            ..Default::default()
        })
    }
}

fn file_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name.replace('/', "_"))
}

#[tokio::test]
async fn media_groups_start_on_fresh_blocks() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&[BlockSize::Kib4, BlockSize::Kib64]).await;
    let transcoder = FakeTranscoder {
        out: tmp.path().to_path_buf(),
    };

    let mut container = Container::new(store.clone(), ContainerMeta::new(ContentType::Video));
    let files = transcode_and_ingest(&transcoder, &mut container, &[tmp.path().join("in.mov")])
        .await
        .unwrap();

    let positions: Vec<(&str, u32, u64)> = files
        .iter()
        .map(|f| (f.name.as_str(), f.block, f.offset))
        .collect();
    assert_eq!(
        positions,
        vec![
            ("manifest.mpd", 0, 0),
            ("360p/init.mp4", 0, KIB),
            ("en.vtt", 1, 0),
            ("360p/seg0.m4s", 2, 0),
            ("360p/seg1.m4s", 2, 20 * KIB),
            ("360p/seg2.m4s", 2, 40 * KIB),
        ]
    );
    let sizes: Vec<BlockSize> = container
        .data_blocks()
        .iter()
        .map(|b| b.block_ref.size)
        .collect();
    assert_eq!(sizes, vec![BlockSize::Kib4, BlockSize::Kib4, BlockSize::Kib64]);

    let info = container.publish().await.unwrap();
    let reader = ContainerReader::from_url(store, &info.links.ciph.open).unwrap();
    let meta = reader.meta().await.unwrap();
    assert_eq!(meta.video.len(), 1);
    assert_eq!(meta.video[0].height, Some(360));

    let seg = reader.get_file("360p/seg1.m4s").await.unwrap();
    let expected = std::fs::read(file_path(tmp.path(), "360p/seg1.m4s")).unwrap();
    assert_eq!(&seg[..], &expected[..]);
    assert_eq!(reader.find_files("360p/seg*").await.unwrap().len(), 3);
    assert_eq!(reader.verify().await.unwrap().files, 6);
}

#[tokio::test]
async fn transcoder_errors_leave_container_untouched() {
    let tmp = TempDir::new().unwrap();
    let store = seeded_store(&[]).await;
    let transcoder = FakeTranscoder {
        out: tmp.path().to_path_buf(),
    };
    let mut container = Container::new(store, ContainerMeta::new(ContentType::Video));

    let err = transcode_and_ingest(&transcoder, &mut container, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CiphError::MissingField(_)));
    assert!(container.files().is_empty());
}
