//! Identity text codec.
//!
//! An identity is 60 uppercase letters: four 14-letter base-26 fragments
//! (least-significant letter first), each holding one little-endian `u64`
//! of the 32-byte key, followed by a 4-letter checksum derived from the
//! KangarooTwelve hash of the key.
//!
//! [`decode_identity`] checks shape only, so the all-`A` placeholder still
//! decodes; [`checksum_matches`] checks the trailing letters.

use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{TurboShake128, TurboShake128Core};
use thiserror::Error;

use qprobe_catalog::field_type::ID_BYTES;

pub const IDENTITY_LEN: usize = 60;

const FRAGMENTS: usize = 4;
const FRAGMENT_LEN: usize = 14;
const CHECKSUM_LEN: usize = 4;
const CHECKSUM_MASK: u32 = 0x3FFFF;

/// KangarooTwelve with an empty customization string, for inputs up to
/// 8 KiB, is TurboSHAKE128 over `message || 0x00` with domain byte 0x07.
const K12_DOMAIN: u8 = 0x07;

/// The canonical placeholder identity: the zero key.
pub const PLACEHOLDER_IDENTITY: &str =
    "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity must be {IDENTITY_LEN} characters, got {0}")]
    Length(usize),
    #[error("invalid character '{ch}' at position {pos}; identities use A-Z only")]
    InvalidChar { ch: char, pos: usize },
    #[error("fragment {0} exceeds 64 bits")]
    FragmentOverflow(usize),
}

/// Decode identity text into its 32-byte key.
pub fn decode_identity(text: &str) -> Result<[u8; ID_BYTES], IdentityError> {
    let text = text.trim();
    let len = text.chars().count();
    if len != IDENTITY_LEN {
        return Err(IdentityError::Length(len));
    }

    if let Some((pos, ch)) = text.chars().enumerate().find(|(_, c)| !c.is_ascii_uppercase()) {
        return Err(IdentityError::InvalidChar { ch, pos });
    }

    let bytes = text.as_bytes();
    let mut key = [0u8; ID_BYTES];

    for fragment in 0..FRAGMENTS {
        let letters = &bytes[fragment * FRAGMENT_LEN..(fragment + 1) * FRAGMENT_LEN];
        let mut value: u64 = 0;
        for &letter in letters.iter().rev() {
            value = value
                .checked_mul(26)
                .and_then(|v| v.checked_add(u64::from(letter - b'A')))
                .ok_or(IdentityError::FragmentOverflow(fragment))?;
        }
        key[fragment * 8..(fragment + 1) * 8].copy_from_slice(&value.to_le_bytes());
    }

    Ok(key)
}

/// Key of the contract with the given index.
pub fn contract_identity(index: u32) -> [u8; ID_BYTES] {
    let mut key = [0u8; ID_BYTES];
    key[..8].copy_from_slice(&u64::from(index).to_le_bytes());
    key
}

/// The full 60-letter identity of a key.
pub fn encode_identity(key: &[u8; ID_BYTES]) -> String {
    let mut out = identity_body(key);
    out.push_str(&checksum_letters(key));
    out
}

/// Whether the trailing four letters are the checksum of the decoded key.
pub fn checksum_matches(text: &str) -> Result<bool, IdentityError> {
    let key = decode_identity(text)?;
    let text = text.trim();
    Ok(text[FRAGMENTS * FRAGMENT_LEN..] == checksum_letters(&key))
}

fn checksum_letters(key: &[u8; ID_BYTES]) -> String {
    let mut hasher = TurboShake128::from_core(TurboShake128Core::new(K12_DOMAIN));
    hasher.update(key);
    hasher.update(&[0x00]);
    let mut digest = [0u8; 3];
    hasher.finalize_xof().read(&mut digest);

    let mut value = u32::from_le_bytes([digest[0], digest[1], digest[2], 0]) & CHECKSUM_MASK;
    let mut out = String::with_capacity(CHECKSUM_LEN);
    for _ in 0..CHECKSUM_LEN {
        out.push(char::from(b'A' + (value % 26) as u8));
        value /= 26;
    }
    out
}

/// The 56-letter body of an identity, without its checksum.
pub fn identity_body(key: &[u8; ID_BYTES]) -> String {
    let mut out = String::with_capacity(FRAGMENTS * FRAGMENT_LEN);
    for chunk in key.chunks_exact(8) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        let mut value = u64::from_le_bytes(buf);
        for _ in 0..FRAGMENT_LEN {
            out.push(char::from(b'A' + (value % 26) as u8));
            value /= 26;
        }
    }
    out
}
