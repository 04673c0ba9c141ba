//! AWS Signature Version 4 request signing.
//!
//! The harness never signs requests itself; it hands each outgoing request
//! to a [`RequestSigner`].  [`SigV4Signer`] is the stock implementation and
//! decorates a request with `host`, `x-amz-date` and `Authorization`
//! headers following the SigV4 algorithm:
//! 1. Build a canonical request
//! 2. Build a string-to-sign
//! 3. Derive a signing key via HMAC chain
//! 4. Compute the signature

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, HOST, USER_AGENT};
use http::{HeaderMap, Method};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::errors::HarnessError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request timestamp.
pub const X_AMZ_DATE: &str = "x-amz-date";

/// Header carrying the hex SHA-256 of the request body.
pub const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Decorates an outgoing request with authentication headers.
pub trait RequestSigner: fmt::Debug + Send + Sync {
    /// Add whatever headers are needed to authenticate `method url` with
    /// the given headers and body digest.
    fn sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &mut HeaderMap,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), HarnessError>;
}

/// Header-based SigV4 signer for a single set of credentials.
#[derive(Clone)]
pub struct SigV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
}

impl fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
        }
    }
}

impl RequestSigner for SigV4Signer {
    fn sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &mut HeaderMap,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), HarnessError> {
        let host = url
            .host_str()
            .ok_or_else(|| HarnessError::InvalidRequest(format!("URL has no host: {url}")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        headers.insert(HOST, header_value(&host)?);
        headers.insert(HeaderName::from_static(X_AMZ_DATE), header_value(&amz_date)?);
        headers.insert(
            HeaderName::from_static(X_AMZ_CONTENT_SHA256),
            header_value(payload_hash)?,
        );

        let signing_headers = extract_headers_for_signing(headers);
        let signed_headers = signing_headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = build_canonical_request(
            method.as_str(),
            &s3_uri_encode_path(url.path()),
            url.query().unwrap_or(""),
            &signing_headers,
            &signed_headers,
            payload_hash,
        );

        let credential_scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = build_string_to_sign(&amz_date, &credential_scope, &canonical_request);
        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, SERVICE);
        let signature = compute_signature(&signing_key, &string_to_sign);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        );
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, HarnessError> {
    HeaderValue::from_str(value)
        .map_err(|_| HarnessError::InvalidRequest(format!("invalid header value: {value:?}")))
}

// ── Canonical request construction ──────────────────────────────────

/// Build the canonical request string.
///
/// ```text
/// HTTPMethod + '\n' +
/// CanonicalURI + '\n' +
/// CanonicalQueryString + '\n' +
/// CanonicalHeaders + '\n' +
/// SignedHeaders + '\n' +
/// HashedPayload
/// ```
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query_string: &str,
    headers: &[(String, String)],
    signed_headers_str: &str,
    payload_hash: &str,
) -> String {
    let canonical_uri = if uri.is_empty() { "/" } else { uri };
    let canonical_query = build_canonical_query_string(query_string);

    let mut canonical_headers = String::new();
    for name in signed_headers_str.split(';') {
        if let Some((hname, hval)) = headers.iter().find(|(hname, _)| hname == name) {
            canonical_headers.push_str(hname);
            canonical_headers.push(':');
            canonical_headers.push_str(&collapse_whitespace(hval));
            canonical_headers.push('\n');
        }
    }

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers_str}\n{payload_hash}"
    )
}

/// Build the canonical query string from a raw query string.
///
/// Parameters are decoded, re-encoded with S3 rules and sorted by name
/// then value.  Parameters with no value use an empty value: `acl=`.
pub fn build_canonical_query_string(query_string: &str) -> String {
    if query_string.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = query_string
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            (
                s3_uri_encode(&percent_decode(k), true),
                s3_uri_encode(&percent_decode(v), true),
            )
        })
        .collect();

    params.sort();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

// ── String to sign ──────────────────────────────────────────────────

/// Build the string to sign.
///
/// ```text
/// AWS4-HMAC-SHA256 + '\n' +
/// Timestamp + '\n' +
/// CredentialScope + '\n' +
/// HexEncode(SHA256(CanonicalRequest))
/// ```
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request: &str,
) -> String {
    let hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("{ALGORITHM}\n{timestamp}\n{credential_scope}\n{hash}")
}

// ── Signing key derivation ──────────────────────────────────────────

/// Derive the signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC-SHA256("AWS4" + secret, dateStamp)
/// kRegion  = HMAC-SHA256(kDate, region)
/// kService = HMAC-SHA256(kRegion, "s3")
/// kSigning = HMAC-SHA256(kService, "aws4_request")
/// ```
pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute the signature: HexEncode(HMAC-SHA256(SigningKey, StringToSign)).
pub fn compute_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

// ── URI encoding ────────────────────────────────────────────────────

/// S3-compatible URI encoding (RFC 3986 with S3 exceptions).
///
/// - Characters A-Z, a-z, 0-9, -, _, ., ~ are NOT encoded.
/// - All other characters are percent-encoded with uppercase hex.
/// - If `encode_slash` is false, `/` is NOT encoded (for URI paths).
pub fn s3_uri_encode(input: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len() * 2);
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == '~' {
            encoded.push(ch);
        } else if ch == '/' && !encode_slash {
            encoded.push('/');
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).as_bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}

/// URI-encode a path for S3 canonical requests, preserving `/`.
///
/// The path may already be percent-encoded (as `Url::path` returns it),
/// so it is decoded first and each segment re-encoded.
pub fn s3_uri_encode_path(raw_path: &str) -> String {
    if raw_path.is_empty() || raw_path == "/" {
        return "/".to_string();
    }
    let decoded = percent_decode(raw_path);
    let result = decoded
        .split('/')
        .map(|seg| s3_uri_encode(seg, false))
        .collect::<Vec<_>>()
        .join("/");
    if result.starts_with('/') {
        result
    } else {
        format!("/{result}")
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Collapse consecutive whitespace in a header value to a single space,
/// and trim leading/trailing whitespace.
fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            result.push(ch);
            last_was_space = false;
        }
    }
    result
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}

/// Headers to sign as sorted (lowercase-name, value) pairs.
///
/// `user-agent` is left unsigned since proxies may rewrite it, and any
/// stale `authorization` header is ignored.  Repeated headers are joined
/// with a comma.
pub fn extract_headers_for_signing(header_map: &HeaderMap) -> Vec<(String, String)> {
    let mut header_values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in header_map {
        if name == USER_AGENT || name == AUTHORIZATION {
            continue;
        }
        let val = value.to_str().unwrap_or("").to_string();
        header_values
            .entry(name.as_str().to_lowercase())
            .or_default()
            .push(val);
    }

    header_values
        .into_iter()
        .map(|(name, values)| (name, values.join(",")))
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────
