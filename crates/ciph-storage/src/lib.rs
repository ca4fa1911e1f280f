//! ciph-storage: block I/O for the ciph container engine
//!
//! Blocks are content addressed: the ID of a block is the first 16 bytes of
//! the SHA-256 of its bytes, and every block is exactly one table size long.
//! The engine only talks to [`BlockStore`]; [`OperatorBlockStore`] is the
//! OpenDAL implementation (S3-compatible endpoints, or in-memory for tests).

pub mod health;
pub mod mixer;
pub mod operator;
pub mod store;

pub use health::{check_health, is_healthy};
pub use mixer::{publish, recombine};
pub use operator::{build_operator, OperatorBlockStore, S3Credentials};
pub use store::{seed_cover_blocks, BlockStore};
