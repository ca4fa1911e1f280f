//! Retrieve a published container from its link

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use ciph_core::{CiphError, CiphResult, ContentType, Link};
use ciph_crypto::cipher::apply_keystream;
use ciph_crypto::{sha256, ContainerKey};
use ciph_storage::{mixer, BlockStore};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::container::container_ids;
use crate::head::{parse_head, DataBlock, Head, HeadData};
use crate::meta::{gunzip, ContainerFile, ContainerMeta};

const DEFAULT_FAN_OUT: usize = 4;

/// Data blocks holding one file: `first..=last`, starting `offset` bytes
/// into `first`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub first: usize,
    pub last: usize,
    pub offset: u64,
}

impl BlockSpan {
    pub fn block_count(&self) -> usize {
        self.last - self.first + 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Files read back with a matching digest
    pub files: usize,
    /// Bytes of file data read back
    pub bytes: u64,
    /// Data blocks fetched and validated
    pub blocks: usize,
}

struct LoadedHead {
    head: Head,
    public_id: String,
    private_id: String,
}

/// Reads a container. The head is fetched and verified once, on first use.
pub struct ContainerReader {
    store: Arc<dyn BlockStore>,
    link: Link,
    fan_out: usize,
    loaded: OnceCell<LoadedHead>,
}

impl std::fmt::Debug for ContainerReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("link", &self.link)
            .field("loaded", &self.loaded.initialized())
            .finish()
    }
}

impl ContainerReader {
    pub fn new(store: Arc<dyn BlockStore>, link: Link) -> Self {
        Self {
            store,
            link,
            fan_out: DEFAULT_FAN_OUT,
            loaded: OnceCell::new(),
        }
    }

    /// Parse a bare, `ciph://` or web link.
    pub fn from_url(store: Arc<dyn BlockStore>, url: &str) -> CiphResult<Self> {
        Ok(Self::new(store, url.parse()?))
    }

    /// Supply the password for a secure link.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.link = self.link.with_password(password);
        self.loaded = OnceCell::new();
        self
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    async fn loaded(&self) -> CiphResult<&LoadedHead> {
        self.loaded.get_or_try_init(|| self.load_head()).await
    }

    async fn load_head(&self) -> CiphResult<LoadedHead> {
        let password = self.link.password().ok_or(CiphError::MissingKey)?;

        let head_ref = self.link.head_ref();
        let block = mixer::recombine(self.store.as_ref(), &head_ref).await?;
        let (head, key): (Head, ContainerKey) =
            parse_head(&block, password, &self.link.salt, self.link.content_type)?;
        let (public_id, private_id) = container_ids(&head_ref.ids, &key);

        debug!(
            content_type = %head.content_type,
            files = head.meta.files.len(),
            data_blocks = head.data_blocks().len(),
            inline = head.data.is_inline(),
            "loaded head"
        );
        Ok(LoadedHead {
            head,
            public_id,
            private_id,
        })
    }

    pub async fn head(&self) -> CiphResult<&Head> {
        Ok(&self.loaded().await?.head)
    }

    pub async fn meta(&self) -> CiphResult<&ContainerMeta> {
        Ok(&self.loaded().await?.head.meta)
    }

    /// Hex chat key.
    pub async fn chat_key(&self) -> CiphResult<String> {
        Ok(hex::encode(self.loaded().await?.head.chat_key))
    }

    pub async fn public_id(&self) -> CiphResult<&str> {
        Ok(&self.loaded().await?.public_id)
    }

    pub async fn private_id(&self) -> CiphResult<&str> {
        Ok(&self.loaded().await?.private_id)
    }

    pub async fn find_file(&self, name: &str) -> CiphResult<Option<&ContainerFile>> {
        Ok(self.meta().await?.files.iter().find(|f| f.name == name))
    }

    /// Files whose names match a glob pattern, in container order.
    pub async fn find_files(&self, pattern: &str) -> CiphResult<Vec<&ContainerFile>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| CiphError::Other(anyhow::anyhow!("invalid pattern {pattern:?}: {e}")))?;
        Ok(self
            .meta()
            .await?
            .files
            .iter()
            .filter(|f| pattern.matches(&f.name))
            .collect())
    }

    pub async fn blocks_for_file(&self, file: &ContainerFile) -> CiphResult<Option<BlockSpan>> {
        block_span(self.head().await?.data_blocks(), file)
    }

    pub async fn get_file(&self, name: &str) -> CiphResult<Bytes> {
        let file = self
            .find_file(name)
            .await?
            .ok_or_else(|| CiphError::FileNotFound(name.to_string()))?;
        self.read_file(file).await
    }

    /// Fetch a file's bytes and check them against its digest.
    pub async fn read_file(&self, file: &ContainerFile) -> CiphResult<Bytes> {
        let head = self.head().await?;
        let data = match &head.data {
            HeadData::Inline(data) => slice_inline(data, file)?,
            HeadData::Blocks(blocks) => match block_span(blocks, file)? {
                None => Bytes::new(),
                Some(span) => {
                    let plain = self.fetch_blocks(&blocks[span.first..=span.last]).await?;
                    assemble(&plain, span.offset, file.length)
                }
            },
        };

        if hex::encode(sha256(&data)) != file.digest {
            return Err(CiphError::FileDigest(file.name.clone()));
        }
        debug!(name = %file.name, length = file.length, "read file");
        Ok(data)
    }

    /// The whole data stream.
    ///
    /// Padding of short blocks is skipped. Fails `BlockValidation` if the
    /// blocks hold less than the data length.
    pub async fn data(&self) -> CiphResult<Bytes> {
        let head = self.head().await?;
        match &head.data {
            HeadData::Inline(data) => Ok(data.clone()),
            HeadData::Blocks(blocks) => {
                check_stream_length(head)?;
                let plain = self.fetch_blocks(blocks).await?;
                let mut out = BytesMut::with_capacity(head.data_length as usize);
                for (i, block) in plain.iter().enumerate() {
                    let len = head.meta.block_content_len(i, block.len() as u64) as usize;
                    out.extend_from_slice(&block[..len]);
                }
                out.truncate(head.data_length as usize);
                Ok(out.freeze())
            }
        }
    }

    /// Decompressed text of a page container.
    pub async fn page_text(&self) -> CiphResult<String> {
        let content_type = self.head().await?.content_type;
        if content_type != ContentType::Page {
            return Err(CiphError::InvalidContentType(format!(
                "{content_type} container has no page text"
            )));
        }
        let text = gunzip(&self.data().await?)?;
        String::from_utf8(text).map_err(|e| CiphError::Other(e.into()))
    }

    /// Read back every file, then every data block no file covers.
    pub async fn verify(&self) -> CiphResult<VerifyReport> {
        let head = self.head().await?;
        check_stream_length(head)?;
        let blocks = head.data_blocks();
        let mut report = VerifyReport::default();
        let mut covered = BTreeSet::new();

        for file in &head.meta.files {
            let data = self.read_file(file).await?;
            if let Some(span) = block_span(blocks, file)? {
                covered.extend(span.first..=span.last);
            }
            report.files += 1;
            report.bytes += data.len() as u64;
        }

        let rest: Vec<DataBlock> = blocks
            .iter()
            .enumerate()
            .filter(|(i, _)| !covered.contains(i))
            .map(|(_, b)| b.clone())
            .collect();
        self.fetch_blocks(&rest).await?;
        report.blocks = covered.len() + rest.len();

        debug!(files = report.files, bytes = report.bytes, blocks = report.blocks, "verified container");
        Ok(report)
    }

    /// Fetch, validate and decrypt blocks, in order.
    async fn fetch_blocks(&self, blocks: &[DataBlock]) -> CiphResult<Vec<Vec<u8>>> {
        futures::stream::iter(blocks)
            .map(|block| fetch_block(self.store.as_ref(), block))
            .buffered(self.fan_out)
            .try_collect()
            .await
    }
}

async fn fetch_block(store: &dyn BlockStore, block: &DataBlock) -> CiphResult<Vec<u8>> {
    let mut buf = mixer::recombine(store, &block.block_ref).await?;
    apply_keystream(block.key.as_bytes(), &block.key.iv(), &mut buf);
    Ok(buf)
}

/// The data blocks must hold at least `data_length` bytes of content.
fn check_stream_length(head: &Head) -> CiphResult<()> {
    let held: u64 = head
        .data_blocks()
        .iter()
        .enumerate()
        .map(|(i, b)| head.meta.block_content_len(i, b.block_ref.size.bytes()))
        .sum();
    if !head.data.is_inline() && held < head.data_length {
        return Err(CiphError::BlockValidation(format!(
            "data blocks hold {held} bytes, head declares {}",
            head.data_length
        )));
    }
    Ok(())
}

/// Locate a file in the data blocks.
///
/// `None` for empty files and inline data. The first block contributes its
/// capacity minus the file's offset, every later block its full capacity.
pub fn block_span(blocks: &[DataBlock], file: &ContainerFile) -> CiphResult<Option<BlockSpan>> {
    if file.length == 0 || blocks.is_empty() {
        return Ok(None);
    }

    let first = file.block as usize;
    let mut remaining = file.length;
    let mut offset = file.offset;
    for (i, block) in blocks.iter().enumerate().skip(first) {
        let capacity = block.block_ref.size.bytes();
        if offset > capacity {
            return Err(CiphError::BlockValidation(format!(
                "file {} starts {offset} bytes into a {} block",
                file.name, block.block_ref.size
            )));
        }
        let available = capacity - offset;
        if remaining <= available {
            return Ok(Some(BlockSpan {
                first,
                last: i,
                offset: file.offset,
            }));
        }
        remaining -= available;
        offset = 0;
    }

    Err(CiphError::BlockValidation(format!(
        "file {} extends past the last data block",
        file.name
    )))
}

fn slice_inline(data: &Bytes, file: &ContainerFile) -> CiphResult<Bytes> {
    let start = file.stream_offset;
    let end = start
        .checked_add(file.length)
        .filter(|end| *end <= data.len() as u64)
        .ok_or_else(|| {
            CiphError::BlockValidation(format!("file {} extends past the inline data", file.name))
        })?;
    Ok(data.slice(start as usize..end as usize))
}

/// Join decrypted blocks into `length` file bytes starting at `offset`.
fn assemble(blocks: &[Vec<u8>], offset: u64, length: u64) -> Bytes {
    let mut out = BytesMut::with_capacity(length as usize);
    let mut remaining = length as usize;
    for (i, block) in blocks.iter().enumerate() {
        let start = if i == 0 {
            (offset as usize).min(block.len())
        } else {
            0
        };
        let n = remaining.min(block.len() - start);
        out.extend_from_slice(&block[start..start + n]);
        remaining -= n;
    }
    out.freeze()
}
