//! Container engine: ingest data and files, then seal and publish
//!
//! A container is single-writer: every mutating call takes `&mut self`.
//! Data blocks are cut in ingest order and published concurrently, up to
//! `fan_out` at a time; their indices follow cut order, not completion order.
//!
//! ```text
//! Building ──publish()──▶ Sealing ──head stored──▶ Published
//!    ▲                       │
//!    └──── error / drop ─────┘
//! ```
//!
//! Data cut for a block goes back into the queue if its upload fails, so a
//! later flush or publish retries it. A file whose ingest fails is removed
//! again; if some of its bytes already went out in a data block the
//! container becomes `Failed` and refuses further changes.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use ciph_core::config::PublishConfig;
use ciph_core::link::LINK_SCHEME;
use ciph_core::{BlockSize, CiphError, CiphResult, ContentType, Link};
use ciph_crypto::{
    derive_key, encrypt_padded, generate_block_key, new_chat_key, new_random_secret, new_salt,
    short_digest, ContainerKey, SALT_SIZE,
};
use ciph_storage::{mixer, BlockStore};
use futures::{StreamExt, TryStreamExt};
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::events::{ContainerEvent, EventFn};
use crate::head::{build_head, DataBlock, HeadData, HeadFields, CHAT_KEY_LEN, FIXED_LEN, PREFIX_LEN};
use crate::meta::{ContainerFile, ContainerMeta, ShortBlock};
use crate::planner::DataPlanner;
use crate::reader::{ContainerReader, VerifyReport};

/// Read size for files ingested from disk
const READ_CHUNK: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Base URL for web links
    pub api_url: String,
    /// Maximum concurrent data block publications
    pub fan_out: usize,
    /// Block size used to flush data added without a target size
    pub flush_threshold: BlockSize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self::from(&PublishConfig::default())
    }
}

impl From<&PublishConfig> for ContainerOptions {
    fn from(cfg: &PublishConfig) -> Self {
        Self {
            api_url: cfg.api_url.clone(),
            fan_out: cfg.fan_out.max(1),
            flush_threshold: cfg.flush_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Building,
    Sealing,
    Published,
    /// A file was partly cut into data blocks and then failed
    Failed,
}

#[derive(Debug, Clone)]
pub enum FileSource {
    /// Streamed from disk in bounded chunks
    Path(PathBuf),
    Memory(Bytes),
}

#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    pub source: FileSource,
}

impl FileInput {
    pub fn path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Path(path.into()),
        }
    }

    pub fn memory(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: FileSource::Memory(data.into()),
        }
    }
}

enum OpenSource {
    File(tokio::fs::File),
    Memory(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    pub open: String,
    pub secure: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLinks {
    pub ciph: LinkPair,
    pub web: LinkPair,
}

/// What a publisher hands out once the container is published.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Hex chat key
    pub chat_key: String,
    /// Container password
    pub key: SecretString,
    pub links: ContainerLinks,
    /// Identifies the container without implying the key
    pub public_id: String,
    /// Proves possession of the key
    pub private_id: String,
}

struct PublishedState {
    link: Link,
    password: SecretString,
    chat_key: [u8; CHAT_KEY_LEN],
    public_id: String,
    private_id: String,
    inline: bool,
}

pub struct Container {
    store: Arc<dyn BlockStore>,
    options: ContainerOptions,
    state: ContainerState,
    meta: ContainerMeta,
    password: Option<SecretString>,
    planner: DataPlanner,
    files: Vec<ContainerFile>,
    /// First file whose data block position is not final yet
    next_unresolved: usize,
    /// Stream bytes already cut into data blocks
    cut_offset: u64,
    data_length: u64,
    data_blocks: Vec<DataBlock>,
    short_blocks: Vec<ShortBlock>,
    events: Option<EventFn>,
    published: Option<PublishedState>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("state", &self.state)
            .field("content_type", &self.meta.content_type)
            .field("files", &self.files.len())
            .field("data_length", &self.data_length)
            .field("data_blocks", &self.data_blocks.len())
            .finish()
    }
}

/// Resets a container to `Building` unless sealing ran to completion,
/// including when the publish future is dropped mid-flight.
struct SealGuard<'a> {
    container: &'a mut Container,
    sealed: bool,
}

impl Drop for SealGuard<'_> {
    fn drop(&mut self) {
        if !self.sealed && self.container.state == ContainerState::Sealing {
            self.container.state = ContainerState::Building;
        }
    }
}

/// Removes a file whose ingest did not finish, on error or drop.
struct FileGuard<'a> {
    container: &'a mut Container,
    index: usize,
    done: bool,
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.container.abandon_file(self.index);
        }
    }
}

/// Cut data awaiting upload. Unless committed, it goes back to the front
/// of the planner.
struct PendingCuts<'a> {
    planner: &'a mut DataPlanner,
    cuts: Vec<Bytes>,
    committed: bool,
}

impl PendingCuts<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingCuts<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let cuts = std::mem::take(&mut self.cuts);
            debug!(cuts = cuts.len(), "returning unpublished cuts to the queue");
            self.planner.restore(cuts);
        }
    }
}

impl Container {
    pub fn new(store: Arc<dyn BlockStore>, meta: ContainerMeta) -> Self {
        Self {
            store,
            options: ContainerOptions::default(),
            state: ContainerState::Building,
            meta,
            password: None,
            planner: DataPlanner::new(),
            files: Vec::new(),
            next_unresolved: 0,
            cut_offset: 0,
            data_length: 0,
            data_blocks: Vec::new(),
            short_blocks: Vec::new(),
            events: None,
            published: None,
        }
    }

    pub fn with_options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    /// Use this password instead of a random one.
    pub fn with_password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    pub fn with_events(mut self, events: EventFn) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn content_type(&self) -> ContentType {
        self.meta.content_type
    }

    pub fn meta(&self) -> &ContainerMeta {
        &self.meta
    }

    pub fn files(&self) -> &[ContainerFile] {
        &self.files
    }

    pub fn data_blocks(&self) -> &[DataBlock] {
        &self.data_blocks
    }

    pub fn data_length(&self) -> u64 {
        self.data_length
    }

    /// Bytes added but not yet cut into a data block.
    pub fn queued_len(&self) -> u64 {
        self.planner.queued_len()
    }

    fn ensure_building(&self) -> CiphResult<()> {
        match self.state {
            ContainerState::Building => Ok(()),
            ContainerState::Sealing | ContainerState::Published => Err(CiphError::Sealed),
            ContainerState::Failed => Err(CiphError::Failed(
                "a file failed after part of it was published".into(),
            )),
        }
    }

    fn emit(&self, event: ContainerEvent) {
        if let Some(cb) = &self.events {
            cb(&event);
        }
    }

    /// Replace the metadata. The file list is managed by the container and
    /// the content type cannot change.
    pub fn set_meta(&mut self, meta: ContainerMeta) -> CiphResult<()> {
        self.ensure_building()?;
        if meta.content_type != self.meta.content_type {
            return Err(CiphError::InvalidContentType(format!(
                "container is {}, metadata says {}",
                self.meta.content_type, meta.content_type
            )));
        }
        self.meta = meta;
        Ok(())
    }

    /// Append raw bytes to the data stream.
    ///
    /// Once more than one `size` block is queued, full blocks of that size
    /// are published. Without a size, the configured flush threshold applies.
    /// If that publish fails the bytes stay queued and count as added.
    pub async fn add_data(
        &mut self,
        data: impl Into<Bytes>,
        size: Option<BlockSize>,
    ) -> CiphResult<()> {
        self.ensure_building()?;
        self.ingest(data.into(), size).await
    }

    /// Add one named file to the data stream.
    pub async fn add_file(
        &mut self,
        input: FileInput,
        size: Option<BlockSize>,
    ) -> CiphResult<ContainerFile> {
        self.ensure_building()?;
        let FileInput { name, source } = input;
        if name.is_empty() {
            return Err(CiphError::MissingField("file name".into()));
        }
        if self.files.iter().any(|f| f.name == name) {
            return Err(CiphError::DuplicateFile(name));
        }

        // Open before registering so a missing path leaves no trace
        let source = match source {
            FileSource::Path(path) => OpenSource::File(tokio::fs::File::open(&path).await?),
            FileSource::Memory(data) => OpenSource::Memory(data),
        };

        // Provisional position: next block to be emitted, after what is
        // queued. Finalized when the block holding the first byte is cut.
        let index = self.files.len();
        self.files.push(ContainerFile {
            name,
            block: block_index(self.data_blocks.len())?,
            offset: self.planner.queued_len(),
            stream_offset: self.data_length,
            length: 0,
            digest: String::new(),
        });

        let mut guard = FileGuard {
            container: self,
            index,
            done: false,
        };
        let (length, digest) = guard.container.ingest_source(source, size).await?;
        guard.done = true;
        drop(guard);

        let file = &mut self.files[index];
        file.length = length;
        file.digest = digest;
        let file = file.clone();

        debug!(name = %file.name, length, "ingested file");
        self.emit(ContainerEvent::FileIngested {
            name: file.name.clone(),
            length,
        });
        Ok(file)
    }

    /// Stream a file into the planner; returns its length and hex digest.
    async fn ingest_source(
        &mut self,
        source: OpenSource,
        size: Option<BlockSize>,
    ) -> CiphResult<(u64, String)> {
        let mut hasher = Sha256::new();
        let mut length = 0u64;
        match source {
            OpenSource::Memory(data) => {
                hasher.update(&data);
                length = data.len() as u64;
                self.ingest(data, size).await?;
            }
            OpenSource::File(mut file) => loop {
                let mut buf = vec![0u8; READ_CHUNK];
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                buf.truncate(n);
                hasher.update(&buf);
                length += n as u64;
                self.ingest(Bytes::from(buf), size).await?;
            },
        }
        Ok((length, hex::encode(hasher.finalize())))
    }

    /// Drop the file at `index` and the bytes it queued.
    ///
    /// Bytes already in a data block cannot be taken back, so in that case
    /// the container is marked `Failed` instead.
    fn abandon_file(&mut self, index: usize) {
        let Some(file) = self.files.get(index) else {
            return;
        };
        let start = file.stream_offset;
        let name = file.name.clone();
        self.files.truncate(index);

        if self.cut_offset <= start {
            self.planner.truncate(start - self.cut_offset);
            self.data_length = start;
            warn!(name = %name, "file ingest failed, removed from container");
        } else {
            self.state = ContainerState::Failed;
            warn!(name = %name, "file ingest failed after data blocks were published");
        }
    }

    /// Add files that start on a fresh block and are published together.
    ///
    /// Anything already queued is published first; whatever is queued after
    /// the last file is published before returning.
    pub async fn add_file_group(
        &mut self,
        inputs: Vec<FileInput>,
        size: Option<BlockSize>,
    ) -> CiphResult<Vec<ContainerFile>> {
        self.ensure_building()?;
        self.flush_all().await?;

        let start = self.files.len();
        for input in inputs {
            self.add_file(input, size).await?;
        }
        self.flush_all().await?;

        Ok(self.files[start..].to_vec())
    }

    async fn ingest(&mut self, data: Bytes, size: Option<BlockSize>) -> CiphResult<()> {
        self.data_length += data.len() as u64;
        self.planner.append(data);

        let target = size.unwrap_or(self.options.flush_threshold);
        if self.planner.should_flush(target.bytes()) {
            let cuts = self.planner.take_full_blocks(target)?;
            debug!(size = %target, blocks = cuts.len(), "flushing full blocks");
            self.publish_cuts(cuts).await?;
        }
        Ok(())
    }

    async fn flush_all(&mut self) -> CiphResult<()> {
        if self.planner.is_empty() {
            return Ok(());
        }
        let cuts = self.planner.drain()?;
        debug!(blocks = cuts.len(), "flushing queued data");
        self.publish_cuts(cuts).await
    }

    async fn publish_cuts(&mut self, cuts: Vec<Bytes>) -> CiphResult<()> {
        let lengths: Vec<u64> = cuts.iter().map(|c| c.len() as u64).collect();
        let store = Arc::clone(&self.store);
        let fan_out = self.options.fan_out.max(1);

        let pending = PendingCuts {
            planner: &mut self.planner,
            cuts: cuts.clone(),
            committed: false,
        };
        let blocks: Vec<DataBlock> = futures::stream::iter(cuts)
            .map(|chunk| {
                let store = Arc::clone(&store);
                async move { publish_data_block(store.as_ref(), &chunk).await }
            })
            .buffered(fan_out)
            .try_collect()
            .await?;
        pending.commit();

        for (block, len) in blocks.into_iter().zip(lengths) {
            let index = self.data_blocks.len();
            self.resolve_files(index, len)?;
            if len < block.block_ref.size.bytes() {
                self.short_blocks.push(ShortBlock {
                    block: block_index(index)?,
                    length: len,
                });
            }
            self.emit(ContainerEvent::BlockPublished {
                index,
                block_ref: block.block_ref,
            });
            self.data_blocks.push(block);
        }
        Ok(())
    }

    /// Pin every file whose first byte falls in the block just cut.
    fn resolve_files(&mut self, index: usize, len: u64) -> CiphResult<()> {
        let block = block_index(index)?;
        let start = self.cut_offset;
        let end = start + len;
        while let Some(file) = self.files.get_mut(self.next_unresolved) {
            if file.stream_offset >= end {
                break;
            }
            file.block = block;
            file.offset = file.stream_offset - start;
            self.next_unresolved += 1;
        }
        self.cut_offset = end;
        Ok(())
    }

    /// File list as it would be written if the data stayed in the head.
    fn inline_files(&self) -> Vec<ContainerFile> {
        self.files
            .iter()
            .cloned()
            .map(|mut f| {
                f.block = 0;
                f.offset = f.stream_offset;
                f
            })
            .collect()
    }

    fn compressed_meta(&self, files: Vec<ContainerFile>) -> CiphResult<Vec<u8>> {
        let mut meta = self.meta.clone();
        meta.files = files;
        meta.short_blocks = self.short_blocks.clone();
        meta.validate()?;
        meta.to_compressed()
    }

    /// Whether the data stream will be carried inside the head block.
    ///
    /// True only if no data block has been emitted and the head, data
    /// included, fits the largest block size.
    pub fn should_include_data(&self) -> CiphResult<bool> {
        if let Some(published) = &self.published {
            return Ok(published.inline);
        }
        if !self.data_blocks.is_empty() {
            return Ok(false);
        }
        let meta = self.compressed_meta(self.inline_files())?;
        let head_len = (PREFIX_LEN + FIXED_LEN + meta.len()) as u64 + self.planner.queued_len();
        Ok(head_len <= BlockSize::MAX.bytes())
    }

    /// Seal the container and publish its head block.
    ///
    /// On error, or if the returned future is dropped, the container goes
    /// back to `Building`. Data blocks already stored stay in the store.
    pub async fn publish(&mut self) -> CiphResult<ContainerInfo> {
        self.ensure_building()?;
        self.state = ContainerState::Sealing;

        let mut guard = SealGuard {
            container: self,
            sealed: false,
        };
        guard.container.seal().await?;
        guard.sealed = true;
        guard.container.info()
    }

    async fn seal(&mut self) -> CiphResult<()> {
        // Fails early on missing required fields
        self.compressed_meta(self.files.clone())?;

        let password = self.password.clone().unwrap_or_else(new_random_secret);
        let salt = new_salt();
        let key = derive_key(&password, &salt)?;
        let chat_key = new_chat_key();

        let inline = self.should_include_data()?;
        let (files, data) = if inline {
            (self.inline_files(), HeadData::Inline(self.planner.snapshot()))
        } else {
            self.flush_all().await?;
            // Only empty files at the very end of the stream are left
            let end = block_index(self.data_blocks.len())?;
            for file in &mut self.files[self.next_unresolved..] {
                file.block = end;
                file.offset = 0;
            }
            (self.files.clone(), HeadData::Blocks(self.data_blocks.clone()))
        };
        let meta = self.compressed_meta(files.clone())?;

        let fields = HeadFields {
            content_type: self.meta.content_type,
            chat_key: &chat_key,
            meta: &meta,
            data_length: self.data_length,
            data: &data,
        };
        fields.block_size().map_err(|_| {
            CiphError::Unsupported(format!(
                "head of {} bytes does not fit the largest block",
                fields.encoded_len()
            ))
        })?;
        let head_block = build_head(&fields, &key, &salt)?;
        let head_ref = mixer::publish(self.store.as_ref(), &head_block).await?;

        let (public_id, private_id) = container_ids(&head_ref.ids, &key);
        self.emit(ContainerEvent::HeadPublished {
            size: head_ref.size,
            public_id: public_id.clone(),
        });
        info!(
            content_type = %self.meta.content_type,
            head_size = %head_ref.size,
            data_blocks = self.data_blocks.len(),
            data_length = self.data_length,
            inline,
            public_id = %public_id,
            "published container"
        );

        self.files = files;
        self.published = Some(PublishedState {
            link: published_link(&head_ref, self.meta.content_type, salt, &password),
            password,
            chat_key,
            public_id,
            private_id,
            inline,
        });
        self.state = ContainerState::Published;
        Ok(())
    }

    pub fn info(&self) -> CiphResult<ContainerInfo> {
        let published = self.published.as_ref().ok_or(CiphError::NotPublished)?;
        let secure = published.link.secure();
        let open = published.link.open().unwrap_or_else(|| secure.clone());
        let api = self.options.api_url.trim_end_matches('/');

        Ok(ContainerInfo {
            chat_key: hex::encode(published.chat_key),
            key: published.password.clone(),
            links: ContainerLinks {
                ciph: LinkPair {
                    open: format!("{LINK_SCHEME}{open}"),
                    secure: format!("{LINK_SCHEME}{secure}"),
                },
                web: LinkPair {
                    open: format!("{api}/enter#{open}"),
                    secure: format!("{api}/enter#{secure}"),
                },
            },
            public_id: published.public_id.clone(),
            private_id: published.private_id.clone(),
        })
    }

    /// The open link of the published container.
    pub fn link(&self) -> CiphResult<Link> {
        self.published
            .as_ref()
            .map(|p| p.link.clone())
            .ok_or(CiphError::NotPublished)
    }

    pub fn head_size(&self) -> CiphResult<BlockSize> {
        Ok(self.link()?.block_size)
    }

    /// A reader over the published container, using the same store.
    pub fn reader(&self) -> CiphResult<ContainerReader> {
        Ok(ContainerReader::new(Arc::clone(&self.store), self.link()?)
            .with_fan_out(self.options.fan_out))
    }

    /// Read the container back from the store through its own link and
    /// check it against what was published.
    pub async fn verify(&self) -> CiphResult<VerifyReport> {
        let reader = self.reader()?;
        let report = reader.verify().await?;

        let head = reader.head().await?;
        if head.meta.files != self.files {
            return Err(CiphError::BlockValidation(
                "published file list differs from the container".into(),
            ));
        }
        if !head.data.is_inline() && head.data_blocks() != self.data_blocks.as_slice() {
            return Err(CiphError::BlockValidation(
                "published data blocks differ from the container".into(),
            ));
        }
        Ok(report)
    }
}

fn block_index(index: usize) -> CiphResult<u32> {
    u32::try_from(index).map_err(|_| CiphError::Encoding("too many data blocks".into()))
}

/// Encrypt one cut of the data stream under a fresh key and publish it.
async fn publish_data_block(store: &dyn BlockStore, chunk: &[u8]) -> CiphResult<DataBlock> {
    let size = BlockSize::fit(chunk.len() as u64)?.size;
    let key = generate_block_key();
    let ciphertext = encrypt_padded(chunk, key.as_bytes(), &key.iv(), size)?;
    let block_ref = mixer::publish(store, &ciphertext).await?;
    Ok(DataBlock { block_ref, key })
}

/// `(public, private)`: SHA-256 of the head IDs, without and with the key.
pub(crate) fn container_ids(ids: &[ciph_core::BlockId; 2], key: &ContainerKey) -> (String, String) {
    let a = &ids[0].as_bytes()[..];
    let b = &ids[1].as_bytes()[..];
    (
        short_digest(&[a, b]),
        short_digest(&[a, b, &key.as_bytes()[..]]),
    )
}

fn published_link(
    head_ref: &ciph_core::BlockRef,
    content_type: ContentType,
    salt: [u8; SALT_SIZE],
    password: &SecretString,
) -> Link {
    Link {
        block_size: head_ref.size,
        content_type,
        ids: head_ref.ids,
        salt,
        password: Some(password.clone()),
    }
}
