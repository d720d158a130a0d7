use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// Length of an encoded token: 32 bytes in unpadded base64url.
pub const TOKEN_LEN: usize = 43;

/// Generate a fresh pass token from the OS CSPRNG, base64url encoded without
/// padding. Encoding whole bytes keeps every character unbiased.
pub fn generate() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Short, log-safe prefix of a token.
pub fn redact(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(6)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
