//! ciph-core: shared types for the ciph container protocol
//!
//! - `block`: the seven standard block sizes and the padding/splitting policy
//! - `types`: block IDs, block references, content types
//! - `link`: the dash-delimited shareable container link
//! - `config`: TOML configuration schema
//! - `error`: the error taxonomy every crate returns

pub mod block;
pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod types;

pub use block::{BlockPlan, BlockSize, SizeFit};
pub use error::{CiphError, CiphResult};
pub use link::Link;
pub use types::{BlockId, BlockRef, ContentType, BLOCK_ID_LEN};
