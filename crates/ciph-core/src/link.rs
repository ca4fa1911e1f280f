//! Shareable container link
//!
//! ```text
//! blockSize-contentType-idA-idB-salt[-password]
//! ```
//!
//! `blockSize` and `contentType` are decimal ranks; `idA`, `idB` and `salt`
//! are 32 lowercase hex chars. Without the password segment the link is
//! "secure" (password supplied out of band); with it the link is "open".
//! Links may be wrapped as `ciph://<link>` or `<api>/enter#<link>`.

use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};

use crate::block::BlockSize;
use crate::error::{CiphError, CiphResult};
use crate::types::{parse_hex16, BlockId, BlockRef, ContentType};

pub const LINK_SCHEME: &str = "ciph://";

#[derive(Clone)]
pub struct Link {
    pub block_size: BlockSize,
    pub content_type: ContentType,
    pub ids: [BlockId; 2],
    pub salt: [u8; 16],
    pub password: Option<SecretString>,
}

impl Link {
    pub fn head_ref(&self) -> BlockRef {
        BlockRef {
            size: self.block_size,
            ids: self.ids,
        }
    }

    /// The link without its password segment.
    pub fn secure(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.block_size.rank(),
            self.content_type.rank(),
            self.ids[0],
            self.ids[1],
            hex::encode(self.salt)
        )
    }

    /// The link with its password segment, if it has one.
    pub fn open(&self) -> Option<String> {
        self.password
            .as_ref()
            .map(|p| format!("{}-{}", self.secure(), p.expose_secret()))
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn is_open(&self) -> bool {
        self.password().is_some()
    }

    /// The password, if present and non-empty.
    pub fn password(&self) -> Option<&SecretString> {
        self.password
            .as_ref()
            .filter(|p| !p.expose_secret().is_empty())
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.block_size == other.block_size
            && self.content_type == other.content_type
            && self.ids == other.ids
            && self.salt == other.salt
            && self.password.as_ref().map(|p| p.expose_secret())
                == other.password.as_ref().map(|p| p.expose_secret())
    }
}

impl Eq for Link {}

/// Remove `scheme://`, `.../enter#` and `.../enter?ciph=` wrappers.
fn strip_wrapping(url: &str) -> &str {
    let url = url.trim();
    if let Some((_, rest)) = url.split_once("/enter#") {
        return rest;
    }
    if let Some((_, rest)) = url.split_once("/enter?ciph=") {
        return rest;
    }
    match url.split_once("://") {
        Some((scheme, rest)) if scheme.chars().all(|c| c.is_ascii_alphanumeric()) => rest,
        _ => url,
    }
}

impl FromStr for Link {
    type Err = CiphError;

    fn from_str(url: &str) -> CiphResult<Self> {
        let body = strip_wrapping(url);
        // Password is the remainder so it may itself contain dashes
        let parts: Vec<&str> = body.splitn(6, '-').collect();
        if parts.len() < 5 {
            return Err(CiphError::InvalidLink(format!(
                "expected at least 5 fields, got {}",
                parts.len()
            )));
        }

        let block_size = parts[0]
            .parse::<u8>()
            .map_err(|_| CiphError::InvalidLink(format!("invalid block size: {}", parts[0])))
            .and_then(BlockSize::from_rank)?;
        let content_type = parts[1]
            .parse::<u8>()
            .map_err(|_| CiphError::InvalidLink(format!("invalid content type: {}", parts[1])))
            .and_then(ContentType::from_rank)?;
        let id_a: BlockId = parts[2]
            .parse()
            .map_err(|_| CiphError::InvalidLink("invalid block id 0".into()))?;
        let id_b: BlockId = parts[3]
            .parse()
            .map_err(|_| CiphError::InvalidLink("invalid block id 1".into()))?;
        let salt = parse_hex16(parts[4]).map_err(|_| CiphError::InvalidLink("invalid salt".into()))?;
        let password = parts
            .get(5)
            .filter(|p| !p.is_empty())
            .map(|p| SecretString::from(p.to_string()));

        Ok(Link {
            block_size,
            content_type,
            ids: [id_a, id_b],
            salt,
            password,
        })
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.open() {
            Some(open) => f.write_str(&open),
            None => f.write_str(&self.secure()),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("block_size", &self.block_size)
            .field("content_type", &self.content_type)
            .field("ids", &self.ids)
            .field("salt", &hex::encode(self.salt))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        format!("0-1-{}-{}-{}", "ab".repeat(16), "cd".repeat(16), "ef".repeat(16))
    }

    #[test]
    fn parse_secure_link() {
        let link: Link = sample().parse().unwrap();
        assert_eq!(link.block_size, BlockSize::Kib4);
        assert_eq!(link.content_type, ContentType::Page);
        assert_eq!(link.ids[0].to_hex(), "ab".repeat(16));
        assert_eq!(link.salt, [0xef; 16]);
        assert!(link.password.is_none());
        assert!(!link.is_open());
        assert_eq!(link.to_string(), sample());
    }

    #[test]
    fn parse_open_link_keeps_dashes_in_password() {
        let link: Link = format!("{}-pass-word", sample()).parse().unwrap();
        assert_eq!(
            link.password().map(|p| p.expose_secret()),
            Some("pass-word")
        );
        assert_eq!(link.open().unwrap(), format!("{}-pass-word", sample()));
        assert_eq!(link.secure(), sample());
    }

    #[test]
    fn parse_strips_scheme_and_web_prefix() {
        let a: Link = format!("ciph://{}", sample()).parse().unwrap();
        let b: Link = format!("https://ciph.io/enter#{}", sample()).parse().unwrap();
        let c: Link = format!("https://ciph.io/enter?ciph={}", sample()).parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn parse_rejects_bad_fields() {
        let id = "ab".repeat(16);
        assert!(format!("7-1-{id}-{id}-{id}").parse::<Link>().is_err());
        assert!(format!("0-9-{id}-{id}-{id}").parse::<Link>().is_err());
        assert!(format!("0-1-xyz-{id}-{id}").parse::<Link>().is_err());
        assert!(format!("0-1-{id}-{id}").parse::<Link>().is_err());
        assert!(format!("0-1-{id}-{id}-{}", "AB".repeat(16))
            .parse::<Link>()
            .is_err());
    }

    #[test]
    fn password_takes_part_in_equality() {
        let secure: Link = sample().parse().unwrap();
        let open = secure.clone().with_password("pw");
        assert_ne!(secure, open);
        assert_eq!(open, format!("{}-pw", sample()).parse::<Link>().unwrap());
        assert!(secure.clone().with_password("").password().is_none());
    }

    #[test]
    fn debug_redacts_password() {
        let link: Link = format!("{}-hunter2", sample()).parse().unwrap();
        let dbg = format!("{link:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("REDACTED"));
    }
}
