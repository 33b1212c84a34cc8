//! Shared Key authorization for the blob service.
//!
//! The signature covers the verb, the standard headers, every `x-ms-*`
//! header and the canonical resource. Only the headers this client sends
//! (`Content-Length` on writes, no body otherwise) are filled in.

use reqwest::{Method, Url};
use shared::crypto::hmac_sha256_base64;
use shared::crypto::SigningError;

/// Builds the string-to-sign for a request.
///
/// `ms_headers` are the `x-ms-*` headers in any order and case.
pub fn string_to_sign(
    method: &Method,
    content_length: u64,
    ms_headers: &[(&str, &str)],
    account: &str,
    url: &Url,
) -> String {
    // Content-Length is signed as an empty line when zero.
    let content_length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let standard_headers = [
        method.as_str(),
        "", // Content-Encoding
        "", // Content-Language
        content_length.as_str(),
        "", // Content-MD5
        "", // Content-Type
        "", // Date (x-ms-date is sent instead)
        "", // If-Modified-Since
        "", // If-Match
        "", // If-None-Match
        "", // If-Unmodified-Since
        "", // Range
    ];

    let mut out = standard_headers.join("\n");
    out.push('\n');
    out.push_str(&canonical_headers(ms_headers));
    out.push_str(&canonical_resource(account, url));
    out
}

fn canonical_headers(ms_headers: &[(&str, &str)]) -> String {
    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim()))
        .filter(|(name, _)| name.starts_with("x-ms-"))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect()
}

/// `/{account}{path}` followed by one `\nname:v1,v2` line per query
/// parameter, names lowercased and sorted, values sorted.
fn canonical_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in url.query_pairs() {
        let name = name.to_lowercase();
        match params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value.into_owned()),
            None => params.push((name, vec![value.into_owned()])),
        }
    }
    params.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, mut values) in params {
        values.sort();
        resource.push_str(&format!("\n{}:{}", name, values.join(",")));
    }
    resource
}

/// Value of the `Authorization` header.
pub fn authorization(
    account: &str,
    key_base64: &str,
    string_to_sign: &str,
) -> Result<String, SigningError> {
    let signature = hmac_sha256_base64(key_base64, string_to_sign)?;
    Ok(format!("SharedKey {}:{}", account, signature))
}
