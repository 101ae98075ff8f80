//! Code payload scrambling for the Python bootstrap.
//!
//! The user's code is XOR-combined with a fresh random 64-byte key and
//! base64-encoded before being embedded in the bootstrap script; the key
//! travels separately on the command line. This keeps casual `cat`-style
//! reads of the on-disk payload unilluminating. It is obfuscation, not
//! security, and nothing in the threat model leans on it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;

pub const KEY_LEN: usize = 64;

/// Generate a fresh payload key.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rng().fill_bytes(&mut key);
    key
}

/// XOR `data` with a repeating `key`. Involution: applying twice restores
/// the input.
pub fn xor(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len()])
        .collect()
}

/// Scramble code for embedding: XOR with `key`, then base64.
pub fn encode(code: &str, key: &[u8; KEY_LEN]) -> String {
    BASE64.encode(xor(code.as_bytes(), key))
}

/// Inverse of [`encode`]; the bootstrap performs this in-process, this
/// function exists for the round-trip law.
pub fn decode(encoded: &str, key: &[u8; KEY_LEN]) -> Option<String> {
    let scrambled = BASE64.decode(encoded).ok()?;
    String::from_utf8(xor(&scrambled, key)).ok()
}

/// Base64 form of the key, as passed on the bootstrap's command line.
pub fn key_b64(key: &[u8; KEY_LEN]) -> String {
    BASE64.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_has_expected_length() {
        assert_eq!(generate_key().len(), 64);
    }

    #[test]
    fn keys_are_not_repeated() {
        assert_ne!(generate_key(), generate_key());
    }

    #[test]
    fn round_trip_restores_code() {
        let key = generate_key();
        let code = "print('hello world')\nimport base64\n";
        let encoded = encode(code, &key);
        assert_ne!(encoded, code);
        assert_eq!(decode(&encoded, &key).as_deref(), Some(code));
    }

    #[test]
    fn round_trip_handles_non_ascii() {
        let key = generate_key();
        let code = "print('héllo — ☃')";
        assert_eq!(decode(&encode(code, &key), &key).as_deref(), Some(code));
    }

    #[test]
    fn xor_is_an_involution() {
        let key = [0x5au8; KEY_LEN];
        let data = b"some payload".to_vec();
        assert_eq!(xor(&xor(&data, &key), &key), data);
    }
}
