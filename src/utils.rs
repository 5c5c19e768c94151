//! Utility functions for id and token generation

use bech32::Bech32m;
use uuid7::uuid7;

/// Length of an opaque share token string.
pub const TOKEN_LEN: usize = 32;

// construct a unique entity id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Generate an opaque fixed-length share token. The string carries no
/// structure; lookups go through the token store keyed on the full value.
pub fn new_share_token() -> String {
    let mut token = sha256::digest(uuid7().as_bytes());
    token.truncate(TOKEN_LEN);
    token
}
