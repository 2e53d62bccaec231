//! OAuth 1.0a HMAC-SHA1 request signing for the microblogging API.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::collections::BTreeMap;
use std::fmt;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay as-is, everything else is encoded.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .finish_non_exhaustive()
    }
}

/// A request parameter as it will be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    /// Raw file payload; never part of the signature.
    Binary(Vec<u8>),
}

impl ParamValue {
    /// Text value eligible for the signature base, if any. File references
    /// (`@path`) and byte blobs are excluded.
    fn signable(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) if !s.starts_with('@') => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, UNRESERVED).to_string()
}

/// Fresh unpredictable nonce.
pub fn new_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Signed `Authorization` header value using the current time and a fresh nonce.
pub fn sign(url: &str, method: &str, params: &[(&str, ParamValue)], credentials: &Credentials) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    sign_with(url, method, params, credentials, &new_nonce(), timestamp)
}

/// Deterministic variant of [`sign`] with explicit nonce and timestamp.
pub fn sign_with(
    url: &str,
    method: &str,
    params: &[(&str, ParamValue)],
    credentials: &Credentials,
    nonce: &str,
    timestamp: i64,
) -> String {
    let mut oauth = oauth_params(credentials, nonce, timestamp);
    let signature = signature(url, method, params, &oauth, credentials);
    oauth.insert("oauth_signature".into(), signature);

    let values: Vec<String> = oauth
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect();
    format!("OAuth {}", values.join(", "))
}

fn oauth_params(credentials: &Credentials, nonce: &str, timestamp: i64) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("oauth_consumer_key".to_string(), credentials.consumer_key.clone()),
        ("oauth_nonce".to_string(), nonce.to_string()),
        ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
        ("oauth_timestamp".to_string(), timestamp.to_string()),
        ("oauth_token".to_string(), credentials.access_token.clone()),
        ("oauth_version".to_string(), "1.0".to_string()),
    ])
}

fn signature(
    url: &str,
    method: &str,
    params: &[(&str, ParamValue)],
    oauth: &BTreeMap<String, String>,
    credentials: &Credentials,
) -> String {
    let base = signature_base_string(url, method, params, oauth);
    let key = format!(
        "{}&{}",
        percent_encode(&credentials.consumer_secret),
        percent_encode(&credentials.access_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// `METHOD&enc(url)&enc(sorted k=v pairs)`. BTreeMap keeps keys in byte order.
pub fn signature_base_string(
    url: &str,
    method: &str,
    params: &[(&str, ParamValue)],
    oauth: &BTreeMap<String, String>,
) -> String {
    let mut signing = oauth.clone();
    for (k, v) in params {
        if let Some(text) = v.signable() {
            signing.insert((*k).to_string(), text.to_string());
        }
    }
    let parameter_string = signing
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&parameter_string)
    )
}
