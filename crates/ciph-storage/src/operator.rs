//! OpenDAL-backed block store
//!
//! Layout: `<prefix>/<rank>/<id hex>.ciph`, one directory per block size so
//! a cover block of a given size can be picked by listing one directory.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use ciph_core::config::{StorageBackend, StorageConfig};
use ciph_core::{BlockId, BlockSize, CiphError, CiphResult};
use opendal::Operator;
use rand::seq::SliceRandom;

use crate::store::BlockStore;

const BLOCK_EXT: &str = ".ciph";

/// Credentials for an S3-compatible endpoint. Loading them is up to the caller.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an OpenDAL Operator for the configured backend.
///
/// Every request goes through a logging layer and a bounded retry layer
/// (`max_retries` attempts with jittered backoff).
///
/// If `enforce_tls` is true and the S3 endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_operator(
    cfg: &StorageConfig,
    credentials: Option<&S3Credentials>,
) -> CiphResult<Operator> {
    match cfg.backend {
        StorageBackend::Memory => {
            let builder = opendal::services::Memory::default().root(&cfg.root);
            finish(builder, cfg.max_retries)
        }
        StorageBackend::S3 => {
            if cfg.endpoint.starts_with("http://") {
                if cfg.enforce_tls {
                    return Err(CiphError::Config(format!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled",
                        cfg.endpoint
                    )));
                }
                tracing::warn!(
                    endpoint = %cfg.endpoint,
                    "S3 endpoint uses plaintext HTTP; set storage.enforce_tls = true in production"
                );
            }

            // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
            let mut builder = opendal::services::S3::default()
                .endpoint(&cfg.endpoint)
                .region(&cfg.region)
                .bucket(&cfg.bucket)
                .root(&cfg.root);
            if let Some(creds) = credentials {
                builder = builder
                    .access_key_id(&creds.access_key_id)
                    .secret_access_key(&creds.secret_access_key);
            }
            finish(builder, cfg.max_retries)
        }
    }
}

fn finish<B: opendal::Builder>(builder: B, max_retries: usize) -> CiphResult<Operator> {
    let op = Operator::new(builder)
        .context("creating OpenDAL operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(max_retries)
                .with_jitter(),
        )
        .finish();
    Ok(op)
}

fn storage_error(e: opendal::Error, what: &str) -> CiphError {
    if e.kind() == opendal::ErrorKind::NotFound {
        CiphError::NotFound(what.to_string())
    } else {
        CiphError::Transport(format!("{what}: {e}"))
    }
}

/// [`BlockStore`] over any OpenDAL operator.
#[derive(Debug, Clone)]
pub struct OperatorBlockStore {
    op: Operator,
    prefix: String,
}

impl OperatorBlockStore {
    pub fn new(op: Operator) -> Self {
        Self::with_prefix(op, "blocks")
    }

    pub fn with_prefix(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(
        cfg: &StorageConfig,
        credentials: Option<&S3Credentials>,
    ) -> CiphResult<Self> {
        Ok(Self::new(build_operator(cfg, credentials)?))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    fn size_dir(&self, size: BlockSize) -> String {
        format!("{}/{}/", self.prefix, size.rank())
    }

    fn block_path(&self, size: BlockSize, id: &BlockId) -> String {
        format!("{}{}{BLOCK_EXT}", self.size_dir(size), id)
    }

    /// IDs of every stored block of `size`.
    pub async fn list_ids(&self, size: BlockSize) -> CiphResult<Vec<BlockId>> {
        let dir = self.size_dir(size);
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error(e, &dir)),
        };

        Ok(entries
            .iter()
            .filter_map(|entry| entry.name().strip_suffix(BLOCK_EXT))
            .filter_map(|stem| stem.parse::<BlockId>().ok())
            .collect())
    }

    pub async fn count(&self, size: BlockSize) -> CiphResult<usize> {
        Ok(self.list_ids(size).await?.len())
    }
}

#[async_trait]
impl BlockStore for OperatorBlockStore {
    async fn get(&self, size: BlockSize, id: &BlockId) -> CiphResult<Bytes> {
        let path = self.block_path(size, id);
        let buf = self
            .op
            .read(&path)
            .await
            .map_err(|e| storage_error(e, &path))?;
        tracing::debug!(size = %size, id = %id, "fetched block");
        Ok(buf.to_bytes())
    }

    async fn get_random(&self, size: BlockSize) -> CiphResult<(BlockId, Bytes)> {
        let ids = self.list_ids(size).await?;
        let id = *ids
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| CiphError::NotFound(format!("no cover blocks of size {size}")))?;
        let data = self.get(size, &id).await?;
        Ok((id, data))
    }

    async fn put(&self, size: BlockSize, data: Bytes) -> CiphResult<BlockId> {
        if data.len() != size.byte_len() {
            return Err(CiphError::BlockValidation(format!(
                "block of {} bytes stored as {size}",
                data.len()
            )));
        }
        let id = ciph_crypto::block_id(&data);
        let path = self.block_path(size, &id);
        self.op
            .write(&path, data)
            .await
            .map_err(|e| storage_error(e, &path))?;
        tracing::debug!(size = %size, id = %id, "stored block");
        Ok(id)
    }
}
