//! Profile key-pair generation and parsing.
//!
//! A key is two-part: the public `key_id` (`ark_` + 24 chars of `[a-z0-9]`)
//! presented as the Bearer identifier, and a 48-char `[A-Za-z0-9]` secret the
//! agent uses to sign scripts. The full `key_id:secret` string is surfaced
//! exactly once, on lock or regenerate.

use std::fmt;

use airlock_crypto::fill_random;

/// Prefix of every profile key id.
pub const KEY_ID_PREFIX: &str = "ark_";
/// Random chars in a key id after the prefix.
pub const KEY_ID_RANDOM_CHARS: usize = 24;
/// Total key id length.
pub const KEY_ID_CHARS: usize = 28;
/// Length of the secret half.
pub const KEY_SECRET_CHARS: usize = 48;

const KEY_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const KEY_SECRET_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A freshly generated key pair. The secret only lives here until it is
/// sealed into the store; `Debug` stays redacted.
#[derive(Clone)]
pub struct ProfileKeyPair {
    pub key_id: String,
    pub secret: String,
}

impl ProfileKeyPair {
    /// Generates a new pair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            key_id: format!(
                "{KEY_ID_PREFIX}{}",
                random_chars(KEY_ID_CHARSET, KEY_ID_RANDOM_CHARS)
            ),
            secret: random_chars(KEY_SECRET_CHARSET, KEY_SECRET_CHARS),
        }
    }

    /// The one-time `ark_ID:SECRET` string handed to the operator.
    pub fn full_key(&self) -> String {
        format!("{}:{}", self.key_id, self.secret)
    }
}

impl fmt::Debug for ProfileKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileKeyPair")
            .field("key_id", &self.key_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Checks that `candidate` has the exact shape of an issued key id.
pub fn is_well_formed_key_id(candidate: &str) -> bool {
    let Some(suffix) = candidate.strip_prefix(KEY_ID_PREFIX) else {
        return false;
    };
    suffix.len() == KEY_ID_RANDOM_CHARS
        && suffix
            .bytes()
            .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit())
}

/// Uniform random selection from `charset` via rejection sampling; no
/// modulo bias.
fn random_chars(charset: &[u8], len: usize) -> String {
    let limit = 256 - (256 % charset.len());
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len {
        fill_random(&mut buf);
        for &byte in buf.iter() {
            if out.len() == len {
                break;
            }
            if (byte as usize) < limit {
                out.push(charset[byte as usize % charset.len()] as char);
            }
        }
    }
    out
}
