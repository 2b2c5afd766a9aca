//! Device code and user code generation.

use base64::Engine;
use rand::{Rng, RngCore};

/// Symbols a human reads off a screen and types back. No 0/O or 1/I/L.
pub const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Symbols per user code, excluding the separator.
pub const USER_CODE_LEN: usize = 8;

const DEVICE_CODE_BYTES: usize = 32;

/// 32 random bytes, base64url without padding.
pub fn generate_device_code() -> String {
    let mut bytes = [0u8; DEVICE_CODE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Eight symbols drawn uniformly from [`USER_CODE_ALPHABET`], as `XXXX-XXXX`.
pub fn generate_user_code() -> String {
    let mut rng = rand::rng();
    let mut code = String::with_capacity(USER_CODE_LEN + 1);
    for i in 0..USER_CODE_LEN {
        if i == USER_CODE_LEN / 2 {
            code.push('-');
        }
        let idx = rng.random_range(0..USER_CODE_ALPHABET.len());
        code.push(char::from(USER_CODE_ALPHABET[idx]));
    }
    code
}

/// Canonicalize human input: drop whitespace, uppercase, and insert the
/// hyphen after the fourth symbol when it was left out.
pub fn normalize_user_code(input: &str) -> String {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    if compact.contains('-') || compact.chars().count() <= USER_CODE_LEN / 2 {
        return compact;
    }
    let split = compact
        .char_indices()
        .nth(USER_CODE_LEN / 2)
        .map_or(compact.len(), |(i, _)| i);
    format!("{}-{}", &compact[..split], &compact[split..])
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn device_code_is_url_safe_and_long() {
        let code = generate_device_code();
        assert_eq!(code.len(), 43);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(code, generate_device_code());
    }

    #[test]
    fn user_code_has_grouped_unambiguous_symbols() {
        for _ in 0..200 {
            let code = generate_user_code();
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
            for c in code.chars().filter(|c| *c != '-') {
                assert!(USER_CODE_ALPHABET.contains(&(c as u8)), "bad symbol {c}");
                assert!(!"0O1IL".contains(c));
            }
        }
    }

    #[test]
    fn user_codes_spread_over_alphabet() {
        let seen: HashSet<char> = (0..500)
            .flat_map(|_| generate_user_code().chars().collect::<Vec<_>>())
            .filter(|c| *c != '-')
            .collect();
        assert!(seen.len() > 25);
    }

    #[test]
    fn normalize_accepts_sloppy_input() {
        assert_eq!(normalize_user_code("abcd-efgh"), "ABCD-EFGH");
        assert_eq!(normalize_user_code("abcdefgh"), "ABCD-EFGH");
        assert_eq!(normalize_user_code(" ab cd ef gh "), "ABCD-EFGH");
        assert_eq!(normalize_user_code("ABCD-EFGH"), "ABCD-EFGH");
    }

    #[test]
    fn normalize_leaves_short_input_alone() {
        assert_eq!(normalize_user_code("ab"), "AB");
        assert_eq!(normalize_user_code(""), "");
    }
}
