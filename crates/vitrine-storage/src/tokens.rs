//! Download tokens persisted in object metadata.
//!
//! Tokens are stored comma separated under `downloadTokens`. The first token is the
//! one embedded in durable URLs, so minting twice yields the same URL.

use std::collections::HashMap;

use uuid::Uuid;
use vitrine_core::constants::metadata_keys::DOWNLOAD_TOKENS;

/// Existing token, or a new one recorded into `metadata`.
pub(crate) fn ensure_download_token(metadata: &mut HashMap<String, String>) -> (String, bool) {
    if let Some(token) = metadata
        .get(DOWNLOAD_TOKENS)
        .and_then(|tokens| tokens.split(',').map(str::trim).find(|t| !t.is_empty()))
    {
        return (token.to_string(), false);
    }
    let token = Uuid::new_v4().to_string();
    metadata.insert(DOWNLOAD_TOKENS.to_string(), token.clone());
    (token, true)
}

/// Carry tokens over when an object is overwritten.
pub(crate) fn carry_over_tokens(
    previous: &HashMap<String, String>,
    next: &mut HashMap<String, String>,
) {
    if next.contains_key(DOWNLOAD_TOKENS) {
        return;
    }
    if let Some(tokens) = previous.get(DOWNLOAD_TOKENS) {
        next.insert(DOWNLOAD_TOKENS.to_string(), tokens.clone());
    }
}

pub(crate) fn url_with_token(base_url: &str, key: &str, token: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!(
        "{}/{}?token={}",
        base_url.trim_end_matches('/'),
        encoded.join("/"),
        token
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_minted_once() {
        let mut metadata = HashMap::new();
        let (first, created) = ensure_download_token(&mut metadata);
        assert!(created);
        let (second, created) = ensure_download_token(&mut metadata);
        assert!(!created);
        assert_eq!(first, second);
    }

    #[test]
    fn url_encodes_segments() {
        assert_eq!(
            url_with_token("http://localhost/files/", "media/a b/x.webp", "t"),
            "http://localhost/files/media/a%20b/x.webp?token=t"
        );
    }
}
