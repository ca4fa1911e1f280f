//! Integration tests: head blocks under wrong keys and tampering.

use bytes::Bytes;
use ciph_container::head::{FIXED_LEN, PREFIX_LEN};
use ciph_container::{build_head, parse_head, parse_head_with_key, ContainerMeta, HeadData, HeadFields};
use ciph_core::{CiphError, ContentType};
use ciph_crypto::{derive_key, new_chat_key, new_salt, ContainerKey};
use secrecy::SecretString;

struct Fixture {
    block: Vec<u8>,
    key: ContainerKey,
    salt: [u8; 16],
    region_len: usize,
}

fn page_head(payload: &'static [u8]) -> Fixture {
    let salt = new_salt();
    let key = derive_key(&SecretString::from("fixture password"), &salt).expect("derive key");
    let meta = ContainerMeta::new(ContentType::Page)
        .with_title("tamper")
        .to_compressed()
        .expect("compress meta");
    let data = HeadData::Inline(Bytes::from_static(payload));
    let fields = HeadFields {
        content_type: ContentType::Page,
        chat_key: &new_chat_key(),
        meta: &meta,
        data_length: payload.len() as u64,
        data: &data,
    };
    let region_len = fields.encoded_len();
    let block = build_head(&fields, &key, &salt).expect("build head");
    Fixture {
        block,
        key,
        salt,
        region_len,
    }
}

#[test]
fn ten_thousand_random_keys_never_parse() {
    let f = page_head(b"hello ciph");
    assert!(parse_head_with_key(&f.block, &f.key, &f.salt).is_ok());

    for _ in 0..10_000 {
        let wrong = ContainerKey::from_bytes(new_chat_key());
        match parse_head_with_key(&f.block, &wrong, &f.salt) {
            Err(CiphError::HeadDigest) => {}
            other => panic!("wrong key produced {other:?}"),
        }
    }
}

#[test]
fn every_bit_flip_in_the_region_is_head_digest() {
    let f = page_head(b"tamper with me");
    assert!(f.region_len > FIXED_LEN);

    // One flip per byte, walking the bit position
    for i in PREFIX_LEN..PREFIX_LEN + f.region_len {
        let mut block = f.block.clone();
        block[i] ^= 1 << (i % 8);
        assert!(
            matches!(
                parse_head_with_key(&block, &f.key, &f.salt),
                Err(CiphError::HeadDigest)
            ),
            "flip at byte {i} was not detected"
        );
    }
}

#[test]
fn padding_is_not_covered_by_the_digest() {
    let f = page_head(b"tail");
    let mut block = f.block.clone();
    let last = block.len() - 1;
    block[last] ^= 0xFF;
    assert!(PREFIX_LEN + f.region_len < last);
    assert!(parse_head_with_key(&block, &f.key, &f.salt).is_ok());
}

#[test]
fn prefix_flips_are_rejected() {
    let f = page_head(b"prefix");
    let password = SecretString::from("fixture password");

    let mut block = f.block.clone();
    block[0] ^= 0x01;
    assert!(matches!(
        parse_head(&block, &password, &f.salt, ContentType::Page),
        Err(CiphError::UnsupportedVersion(0))
    ));

    // Content type moved to another valid rank: the link no longer matches,
    // and with the key alone the digest over the prefix catches it
    let mut block = f.block.clone();
    block[1] = ContentType::Video.rank();
    assert!(matches!(
        parse_head(&block, &password, &f.salt, ContentType::Page),
        Err(CiphError::ContentTypeMismatch { expected: 1, actual: 2 })
    ));
    assert!(matches!(
        parse_head_with_key(&block, &f.key, &f.salt),
        Err(CiphError::HeadDigest)
    ));

    let mut block = f.block.clone();
    block[1] = 0xEE;
    assert!(matches!(
        parse_head_with_key(&block, &f.key, &f.salt),
        Err(CiphError::InvalidContentType(_))
    ));
}
