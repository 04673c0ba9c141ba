//! Unsigned request descriptors, one builder per S3 operation.
//!
//! Every builder follows the same steps: address the bucket/object,
//! digest the body (the empty body for GET/DELETE), then set the
//! `User-Agent`, `X-Amz-Content-Sha256` and any operation-specific
//! headers.  A digest failure yields no request at all.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, RANGE, USER_AGENT};
use http::HeaderMap;

use crate::auth::X_AMZ_CONTENT_SHA256;
use crate::errors::HarnessError;
use crate::hash::{compute_hash, ContentHash};

/// User agent sent with every request.
pub const APP_USER_AGENT: &str = concat!("s3verify/", env!("CARGO_PKG_VERSION"));

/// Region that takes no `CreateBucketConfiguration` body.
const DEFAULT_REGION: &str = "us-east-1";

/// A request ready to be signed and sent.
///
/// Built fresh for every call: the digest headers describe this body only.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Target bucket; empty for service-level calls such as ListBuckets.
    pub bucket_name: String,
    /// Target key, if the request addresses an object.
    pub object_name: Option<String>,
    /// Query parameters, unencoded.
    pub query: Vec<(String, String)>,
    /// Headers set by the builder.  Names are case-insensitive.
    pub custom_headers: HeaderMap,
    /// Request body; empty for bodyless operations.
    pub body: Bytes,
}

impl Request {
    /// Start a request for `bucket_name`/`object_name` carrying `body`,
    /// with the user agent and content digest already set.
    fn new(
        bucket_name: &str,
        object_name: Option<&str>,
        body: Bytes,
    ) -> Result<(Self, ContentHash), HarnessError> {
        let hash = compute_hash(body.as_ref()).map_err(HarnessError::Build)?;

        let mut req = Request {
            bucket_name: bucket_name.to_string(),
            object_name: object_name.map(str::to_string),
            body,
            ..Request::default()
        };
        req.set_header(USER_AGENT, APP_USER_AGENT)?;
        req.set_header(
            HeaderName::from_static(X_AMZ_CONTENT_SHA256),
            &hash.sha256_hex(),
        )?;
        Ok((req, hash))
    }

    fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), HarnessError> {
        let value = HeaderValue::from_str(value).map_err(|_| {
            HarnessError::InvalidRequest(format!("invalid value for {name}: {value:?}"))
        })?;
        self.custom_headers.insert(name, value);
        Ok(())
    }

    /// The `X-Amz-Content-Sha256` value this request was built with.
    pub fn payload_hash(&self) -> &str {
        self.custom_headers
            .get(X_AMZ_CONTENT_SHA256)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// The object key, or the empty string for bucket-level requests.
    pub fn object_key(&self) -> &str {
        self.object_name.as_deref().unwrap_or_default()
    }
}

/// `GET /` -- ListBuckets.
pub fn new_list_buckets_req() -> Result<Request, HarnessError> {
    let (req, _) = Request::new("", None, Bytes::new())?;
    Ok(req)
}

/// `PUT /{bucket}` -- MakeBucket.  Outside `us-east-1` the region is sent
/// as a `LocationConstraint`.
pub fn new_make_bucket_req(bucket_name: &str, region: &str) -> Result<Request, HarnessError> {
    let body = if region.is_empty() || region == DEFAULT_REGION {
        Bytes::new()
    } else {
        Bytes::from(format!(
            "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
             <LocationConstraint>{region}</LocationConstraint>\
             </CreateBucketConfiguration>"
        ))
    };
    let has_body = !body.is_empty();
    let (mut req, _) = Request::new(bucket_name, None, body)?;
    if has_body {
        req.set_header(CONTENT_TYPE, "application/xml")?;
    }
    Ok(req)
}

/// `PUT /{bucket}/{key}` -- PutObject, with `Content-Md5`.
pub fn new_put_object_req(
    bucket_name: &str,
    object_name: &str,
    body: Bytes,
) -> Result<Request, HarnessError> {
    let (mut req, hash) = Request::new(bucket_name, Some(object_name), body)?;
    req.set_header(HeaderName::from_static("content-md5"), &hash.md5_base64())?;
    req.set_header(CONTENT_TYPE, "application/octet-stream")?;
    Ok(req)
}

/// `GET /{bucket}/{key}` -- GetObject.
pub fn new_get_object_req(bucket_name: &str, object_name: &str) -> Result<Request, HarnessError> {
    let (req, _) = Request::new(bucket_name, Some(object_name), Bytes::new())?;
    Ok(req)
}

/// `GET /{bucket}/{key}` with `Range: bytes={start}-{end}` (inclusive).
pub fn new_get_object_range_req(
    bucket_name: &str,
    object_name: &str,
    start_range: u64,
    end_range: u64,
) -> Result<Request, HarnessError> {
    let (mut req, _) = Request::new(bucket_name, Some(object_name), Bytes::new())?;
    req.set_header(RANGE, &format!("bytes={start_range}-{end_range}"))?;
    Ok(req)
}

/// `GET /{bucket}?list-type=2` -- ListObjectsV2, resuming after
/// `continuation_token` when one is given.
pub fn new_list_objects_req(
    bucket_name: &str,
    continuation_token: Option<&str>,
) -> Result<Request, HarnessError> {
    let (mut req, _) = Request::new(bucket_name, None, Bytes::new())?;
    req.query.push(("list-type".to_string(), "2".to_string()));
    if let Some(token) = continuation_token {
        req.query
            .push(("continuation-token".to_string(), token.to_string()));
    }
    Ok(req)
}

/// `DELETE /{bucket}/{key}` -- RemoveObject.
pub fn new_remove_object_req(
    bucket_name: &str,
    object_name: &str,
) -> Result<Request, HarnessError> {
    let (req, _) = Request::new(bucket_name, Some(object_name), Bytes::new())?;
    Ok(req)
}

/// `DELETE /{bucket}` -- RemoveBucket.
pub fn new_remove_bucket_req(bucket_name: &str) -> Result<Request, HarnessError> {
    let (req, _) = Request::new(bucket_name, None, Bytes::new())?;
    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::EMPTY_SHA256;

    #[test]
    fn test_range_request_headers() {
        let req = new_get_object_range_req("bucket", "obj1", 10, 42).unwrap();
        assert_eq!(req.bucket_name, "bucket");
        assert_eq!(req.object_key(), "obj1");
        assert_eq!(req.custom_headers["Range"], "bytes=10-42");
        assert_eq!(req.custom_headers["user-agent"], APP_USER_AGENT);
        assert_eq!(req.payload_hash(), EMPTY_SHA256);
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_remove_bucket_has_empty_digest() {
        let req = new_remove_bucket_req("bucket").unwrap();
        assert!(req.object_name.is_none());
        assert_eq!(req.object_key(), "");
        assert_eq!(req.custom_headers["X-Amz-Content-Sha256"], EMPTY_SHA256);
        assert!(req.custom_headers.get("range").is_none());
    }

    #[test]
    fn test_put_object_digests() {
        let req = new_put_object_req("bucket", "key", Bytes::from_static(b"hello world")).unwrap();
        assert_eq!(
            req.payload_hash(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(req.custom_headers["content-md5"], "XrY7u+Ae7tCTyyK7j1rNww==");
    }

    #[test]
    fn test_make_bucket_location_constraint() {
        let req = new_make_bucket_req("bucket", "us-east-1").unwrap();
        assert!(req.body.is_empty());
        assert!(req.custom_headers.get(CONTENT_TYPE).is_none());

        let req = new_make_bucket_req("bucket", "eu-west-1").unwrap();
        let body = std::str::from_utf8(&req.body).unwrap();
        assert!(body.contains("<LocationConstraint>eu-west-1</LocationConstraint>"));
        assert_ne!(req.payload_hash(), EMPTY_SHA256);
    }

    #[test]
    fn test_list_objects_query() {
        let req = new_list_objects_req("bucket", None).unwrap();
        assert_eq!(req.query, vec![("list-type".to_string(), "2".to_string())]);

        let req = new_list_objects_req("bucket", Some("token")).unwrap();
        assert_eq!(req.query[1], ("continuation-token".to_string(), "token".to_string()));
    }
}
