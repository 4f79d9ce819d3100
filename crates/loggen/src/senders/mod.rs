//! Transports that deliver generated batches.

mod http;

pub use http::HttpSender;

use std::collections::HashMap;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const API_SECRET_HEADER: &str = "X-API-Secret";

/// Credential headers for the ingestion endpoint. Empty values are left out.
pub fn api_headers(api_key: &str, api_secret: &str) -> HashMap<String, String> {
    [(API_KEY_HEADER, api_key), (API_SECRET_HEADER, api_secret)]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credentials_are_skipped() {
        assert!(api_headers("", "").is_empty());

        let headers = api_headers("key", "");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[API_KEY_HEADER], "key");
    }
}
