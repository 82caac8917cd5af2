//! Per-request script signatures: HMAC-SHA256 over the raw script bytes,
//! keyed by the profile secret, rendered as 64 lowercase hex chars.

use hmac::{Hmac, Mac};
use sha2::Sha256;

const SIGNATURE_HEX_CHARS: usize = 64;

/// Computes the signature an agent must send alongside a script.
pub fn sign_script(secret: &str, script: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("hmac-sha256 accepts any key length");
    mac.update(script.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut rendered = String::with_capacity(SIGNATURE_HEX_CHARS);
    for byte in digest {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}

/// Verifies a provided signature in constant time. Anything that is not
/// exactly 64 hex chars fails without touching the MAC.
pub fn verify_script(secret: &str, script: &str, provided_hex: &str) -> bool {
    let Some(signature_bytes) = decode_signature_hex(provided_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(script.as_bytes());
    mac.verify_slice(&signature_bytes).is_ok()
}

fn decode_signature_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() != SIGNATURE_HEX_CHARS {
        return None;
    }
    let mut bytes = Vec::with_capacity(SIGNATURE_HEX_CHARS / 2);
    let raw = raw.as_bytes();
    let mut index = 0usize;
    while index < raw.len() {
        let high = hex_nibble(raw[index])?;
        let low = hex_nibble(raw[index + 1])?;
        bytes.push((high << 4) | low);
        index += 2;
    }
    Some(bytes)
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}
