//! ciph-container: build, publish and read ciph containers
//!
//! ```text
//! files / data ──▶ DataPlanner ──cuts──▶ encrypt (fresh key) ──▶ mixer ──▶ BlockStore
//!                                                        │
//! meta + block refs + keys ──▶ head block ──▶ mixer ─────┘──▶ link
//! ```
//!
//! A [`Container`] is the write side, a [`ContainerReader`] the read side.

pub mod codec;
pub mod container;
pub mod events;
pub mod head;
pub mod media;
pub mod meta;
pub mod page;
pub mod planner;
pub mod reader;

pub use container::{
    Container, ContainerInfo, ContainerLinks, ContainerOptions, ContainerState, FileInput,
    FileSource, LinkPair,
};
pub use events::{ContainerEvent, EventFn};
pub use head::{build_head, parse_head, parse_head_with_key, DataBlock, Head, HeadData, HeadFields};
pub use media::{ingest_media, transcode_and_ingest, MediaFile, MediaPlan, MediaTranscoder, Rendition};
pub use meta::{AudioTrack, ContainerFile, ContainerMeta, ShortBlock, SubtitleTrack, VideoTrack};
pub use page::publish_page;
pub use planner::DataPlanner;
pub use reader::{block_span, BlockSpan, ContainerReader, VerifyReport};
