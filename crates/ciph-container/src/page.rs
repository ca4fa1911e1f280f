//! Page containers: gzipped markdown carried as raw data

use ciph_core::{CiphError, CiphResult, ContentType};
use tracing::debug;

use crate::container::{Container, ContainerInfo};
use crate::meta::gzip;

/// Compress `markdown`, add it as the container's data and publish.
///
/// Small pages end up inline in the head block.
pub async fn publish_page(container: &mut Container, markdown: &str) -> CiphResult<ContainerInfo> {
    if container.content_type() != ContentType::Page {
        return Err(CiphError::InvalidContentType(format!(
            "cannot publish a page into a {} container",
            container.content_type()
        )));
    }
    let data = gzip(markdown.as_bytes())?;
    debug!(text = markdown.len(), compressed = data.len(), "adding page");
    container.add_data(data, None).await?;
    container.publish().await
}
