//! Response verification.
//!
//! Every operation is checked by the same three stages, in order:
//! headers, then status, then body.  The first failing stage ends the
//! check and is the only mismatch reported.

use http::header::{DATE, ETAG};
use http::StatusCode;
use thiserror::Error;

use crate::error_response::{self, ErrorResponse, X_AMZ_REQUEST_ID};
use crate::fixtures::{BucketInfo, ObjectInfo};
use crate::server::ServerResponse;
use crate::xml::{self, ListAllMyBucketsResult, ListBucketResult, ObjectEntry};

/// How a response differed from what S3 would have sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    #[error("Missing Header: {0}")]
    MissingHeader(String),

    #[error("Invalid Header: {name}: {value:?}")]
    InvalidHeader { name: String, value: String },

    #[error("Unexpected Status: wanted {expected}, got {actual}")]
    Status { expected: u16, actual: u16 },

    #[error("Unexpected Body: {0}")]
    Body(String),

    #[error("Unexpected Error: wanted {expected_code} ({expected_message:?}), got {actual_code} ({actual_message:?})")]
    ErrorBody {
        expected_code: String,
        expected_message: String,
        actual_code: String,
        actual_message: String,
    },
}

// ── Stages ──────────────────────────────────────────────────────────

/// Headers every S3 response carries: a valid HTTP `Date` and a
/// non-empty `x-amz-request-id`.
pub fn verify_standard_headers(res: &ServerResponse) -> Result<(), Mismatch> {
    let date = res
        .header(DATE.as_str())
        .ok_or_else(|| Mismatch::MissingHeader("Date".to_string()))?;
    if httpdate::parse_http_date(date).is_err() {
        return Err(Mismatch::InvalidHeader {
            name: "Date".to_string(),
            value: date.to_string(),
        });
    }
    match res.header(X_AMZ_REQUEST_ID) {
        Some(id) if !id.is_empty() => Ok(()),
        _ => Err(Mismatch::MissingHeader(X_AMZ_REQUEST_ID.to_string())),
    }
}

pub fn verify_status(res: &ServerResponse, expected: StatusCode) -> Result<(), Mismatch> {
    if res.status != expected {
        return Err(Mismatch::Status {
            expected: expected.as_u16(),
            actual: res.status.as_u16(),
        });
    }
    Ok(())
}

/// Compare the decoded error against `expected`.  Does nothing when
/// `expected` is the "no error" sentinel.
///
/// Messages are compared ignoring a trailing period, since S3 itself is
/// inconsistent about it.
pub fn verify_error_body(res: &ServerResponse, expected: &ErrorResponse) -> Result<(), Mismatch> {
    if !expected.is_expected() {
        return Ok(());
    }
    let actual = error_response::decode(
        &res.body,
        res.status,
        &res.headers,
        &expected.bucket_name,
        &expected.key,
    );
    let same_message =
        actual.message.trim_end_matches('.') == expected.message.trim_end_matches('.');
    if actual.code != expected.code || !same_message {
        return Err(Mismatch::ErrorBody {
            expected_code: expected.code.to_string(),
            expected_message: expected.message.clone(),
            actual_code: actual.code.to_string(),
            actual_message: actual.message,
        });
    }
    Ok(())
}

/// Exact byte equality against the oracle.
pub fn verify_body_bytes(res: &ServerResponse, oracle: &[u8]) -> Result<(), Mismatch> {
    let body = res.body.as_ref();
    if body == oracle {
        return Ok(());
    }
    let detail = match body.iter().zip(oracle).position(|(a, b)| a != b) {
        Some(offset) => format!(
            "{} bytes differ from expected {} bytes at offset {offset}",
            body.len(),
            oracle.len()
        ),
        None => format!("got {} bytes, wanted {}", body.len(), oracle.len()),
    };
    Err(Mismatch::Body(detail))
}

pub fn verify_empty_body(res: &ServerResponse) -> Result<(), Mismatch> {
    if !res.body.is_empty() {
        return Err(Mismatch::Body(format!(
            "expected no body, got {} bytes",
            res.body.len()
        )));
    }
    Ok(())
}

// ── Per-operation pipelines ─────────────────────────────────────────

/// GetObject, whole or ranged: 200/206 and the oracle bytes, or the
/// expected error.
pub fn get_object_verify(
    res: &ServerResponse,
    oracle: &[u8],
    expected_status: StatusCode,
) -> Result<(), Mismatch> {
    verify_standard_headers(res)?;
    verify_status(res, expected_status)?;
    verify_body_bytes(res, oracle)
}

/// RemoveBucket: 204 with no body, or the expected error.
pub fn remove_bucket_verify(
    res: &ServerResponse,
    expected_status: StatusCode,
    expected_error: &ErrorResponse,
) -> Result<(), Mismatch> {
    verify_standard_headers(res)?;
    verify_status(res, expected_status)?;
    if expected_error.is_expected() {
        verify_error_body(res, expected_error)
    } else {
        verify_empty_body(res)
    }
}

/// RemoveObject: 204 with no body.
pub fn remove_object_verify(
    res: &ServerResponse,
    expected_status: StatusCode,
) -> Result<(), Mismatch> {
    verify_standard_headers(res)?;
    verify_status(res, expected_status)?;
    verify_empty_body(res)
}

/// MakeBucket: only headers and status carry meaning.
pub fn make_bucket_verify(
    res: &ServerResponse,
    expected_status: StatusCode,
    expected_error: &ErrorResponse,
) -> Result<(), Mismatch> {
    verify_standard_headers(res)?;
    verify_status(res, expected_status)?;
    verify_error_body(res, expected_error)
}

/// PutObject: 200 and an `ETag` equal to the quoted hex MD5 of the body.
pub fn put_object_verify(res: &ServerResponse, md5_hex: &str) -> Result<(), Mismatch> {
    verify_standard_headers(res)?;
    verify_status(res, StatusCode::OK)?;
    let etag = res
        .header(ETAG.as_str())
        .ok_or_else(|| Mismatch::MissingHeader("ETag".to_string()))?;
    if etag.trim_matches('"') != md5_hex {
        return Err(Mismatch::InvalidHeader {
            name: "ETag".to_string(),
            value: etag.to_string(),
        });
    }
    Ok(())
}

/// ListBuckets: 200 and every expected bucket listed.
pub fn list_buckets_verify(res: &ServerResponse, expected: &[BucketInfo]) -> Result<(), Mismatch> {
    verify_standard_headers(res)?;
    verify_status(res, StatusCode::OK)?;
    let listing: ListAllMyBucketsResult = xml::parse_document(&res.body, "ListAllMyBucketsResult")
        .map_err(|e| Mismatch::Body(e.to_string()))?;
    for bucket in expected {
        if !listing.buckets.bucket.iter().any(|b| b.name == bucket.name) {
            return Err(Mismatch::Body(format!("bucket {} not listed", bucket.name)));
        }
    }
    Ok(())
}

/// One ListObjectsV2 page: 200 and a `<ListBucketResult>` for `bucket`.
/// A truncated page must carry the token for the next one.
pub fn list_objects_page_verify(
    res: &ServerResponse,
    bucket: &str,
) -> Result<ListBucketResult, Mismatch> {
    verify_standard_headers(res)?;
    verify_status(res, StatusCode::OK)?;
    let listing: ListBucketResult = xml::parse_document(&res.body, "ListBucketResult")
        .map_err(|e| Mismatch::Body(e.to_string()))?;
    if listing.name != bucket {
        return Err(Mismatch::Body(format!(
            "listing is for bucket {:?}, wanted {bucket}",
            listing.name
        )));
    }
    if listing.is_truncated && listing.next_continuation_token.is_empty() {
        return Err(Mismatch::Body(
            "listing truncated without NextContinuationToken".to_string(),
        ));
    }
    Ok(listing)
}

/// Every expected object appears in the full listing with its size.  A
/// listed ETag must be the body's MD5 unless it is a multipart ETag.
pub fn verify_listed_objects(
    listed: &[ObjectEntry],
    expected: &[ObjectInfo],
) -> Result<(), Mismatch> {
    for object in expected {
        let Some(entry) = listed.iter().find(|o| o.key == object.key) else {
            return Err(Mismatch::Body(format!("object {} not listed", object.key)));
        };
        if entry.size != object.size {
            return Err(Mismatch::Body(format!(
                "object {} listed with size {}, wanted {}",
                object.key, entry.size, object.size
            )));
        }
        let etag = entry.etag.trim_matches('"');
        if !etag.is_empty() && !etag.contains('-') && etag != object.md5_hex() {
            return Err(Mismatch::Body(format!(
                "object {} listed with ETag {}, wanted \"{}\"",
                object.key,
                entry.etag,
                object.md5_hex()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};

    fn response(status: StatusCode, body: &'static [u8]) -> ServerResponse {
        let mut headers = HeaderMap::new();
        headers.insert(DATE, HeaderValue::from_static("Sun, 18 Oct 2026 10:00:00 GMT"));
        headers.insert(X_AMZ_REQUEST_ID, HeaderValue::from_static("4442587FB7D0A2F9"));
        ServerResponse {
            status,
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_standard_headers() {
        let mut res = response(StatusCode::OK, b"");
        verify_standard_headers(&res).unwrap();

        res.headers.insert(DATE, HeaderValue::from_static("yesterday"));
        assert!(matches!(
            verify_standard_headers(&res),
            Err(Mismatch::InvalidHeader { .. })
        ));

        res.headers.remove(DATE);
        assert_eq!(
            verify_standard_headers(&res),
            Err(Mismatch::MissingHeader("Date".to_string()))
        );
    }

    #[test]
    fn test_short_circuit_on_headers() {
        // Wrong status and wrong body too, but only the header stage reports.
        let mut res = response(StatusCode::INTERNAL_SERVER_ERROR, b"garbage");
        res.headers.remove(X_AMZ_REQUEST_ID);
        let err = get_object_verify(&res, b"expected", StatusCode::PARTIAL_CONTENT).unwrap_err();
        assert_eq!(err, Mismatch::MissingHeader(X_AMZ_REQUEST_ID.to_string()));
    }

    #[test]
    fn test_short_circuit_on_status() {
        let res = response(StatusCode::OK, b"garbage");
        let err = get_object_verify(&res, b"expected", StatusCode::PARTIAL_CONTENT).unwrap_err();
        assert_eq!(
            err,
            Mismatch::Status {
                expected: 206,
                actual: 200
            }
        );
    }

    #[test]
    fn test_range_body_matches_oracle() {
        let body: Vec<u8> = (0u8..100).collect();
        let oracle = &body[10..=42];
        assert_eq!(oracle.len(), 33);

        let res = ServerResponse {
            body: Bytes::copy_from_slice(oracle),
            ..response(StatusCode::PARTIAL_CONTENT, b"")
        };
        get_object_verify(&res, oracle, StatusCode::PARTIAL_CONTENT).unwrap();

        let wrong = ServerResponse {
            body: Bytes::copy_from_slice(&body[11..=43]),
            ..response(StatusCode::PARTIAL_CONTENT, b"")
        };
        let err = get_object_verify(&wrong, oracle, StatusCode::PARTIAL_CONTENT).unwrap_err();
        assert!(matches!(err, Mismatch::Body(ref d) if d.contains("offset 0")));
    }

    #[test]
    fn test_remove_bucket_success_requires_empty_body() {
        let res = response(StatusCode::NO_CONTENT, b"");
        remove_bucket_verify(&res, StatusCode::NO_CONTENT, &ErrorResponse::none()).unwrap();

        let res = response(StatusCode::NO_CONTENT, b"surprise");
        assert!(matches!(
            remove_bucket_verify(&res, StatusCode::NO_CONTENT, &ErrorResponse::none()),
            Err(Mismatch::Body(_))
        ));
    }

    #[test]
    fn test_remove_bucket_dne_xml_body() {
        let res = response(
            StatusCode::NOT_FOUND,
            b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>NoSuchBucket</Code>\
              <Message>The specified bucket does not exist</Message><BucketName>b</BucketName></Error>",
        );
        let expected = ErrorResponse::no_such_bucket("b");
        remove_bucket_verify(&res, StatusCode::NOT_FOUND, &expected).unwrap();
    }

    #[test]
    fn test_remove_bucket_dne_without_body() {
        // The status-derived message ends in a period; still a match.
        let res = response(StatusCode::NOT_FOUND, b"");
        let expected = ErrorResponse::no_such_bucket("b");
        remove_bucket_verify(&res, StatusCode::NOT_FOUND, &expected).unwrap();
    }

    #[test]
    fn test_remove_bucket_wrong_error_code() {
        let res = response(
            StatusCode::NOT_FOUND,
            b"<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>",
        );
        let err = remove_bucket_verify(&res, StatusCode::NOT_FOUND, &ErrorResponse::no_such_bucket("b"))
            .unwrap_err();
        assert!(matches!(err, Mismatch::ErrorBody { ref actual_code, .. } if actual_code == "NoSuchKey"));
    }

    #[test]
    fn test_put_object_etag() {
        let mut res = response(StatusCode::OK, b"");
        res.headers.insert(
            ETAG,
            HeaderValue::from_static("\"5eb63bbbe01eeed093cb22bb8f5acdc3\""),
        );
        put_object_verify(&res, "5eb63bbbe01eeed093cb22bb8f5acdc3").unwrap();
        assert!(matches!(
            put_object_verify(&res, "00000000000000000000000000000000"),
            Err(Mismatch::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_list_buckets() {
        let res = response(
            StatusCode::OK,
            b"<ListAllMyBucketsResult><Owner><ID>x</ID></Owner><Buckets>\
              <Bucket><Name>alpha</Name><CreationDate>2026-10-18T10:00:00.000Z</CreationDate></Bucket>\
              <Bucket><Name>beta</Name><CreationDate>2026-10-18T10:00:00.000Z</CreationDate></Bucket>\
              </Buckets></ListAllMyBucketsResult>",
        );
        list_buckets_verify(&res, &[BucketInfo::new("beta")]).unwrap();
        let err = list_buckets_verify(&res, &[BucketInfo::new("gamma")]).unwrap_err();
        assert_eq!(err, Mismatch::Body("bucket gamma not listed".to_string()));
    }

    fn entry(key: &str, size: u64, etag: &str) -> ObjectEntry {
        ObjectEntry {
            key: key.to_string(),
            size,
            etag: etag.to_string(),
        }
    }

    #[test]
    fn test_list_objects_page() {
        let res = response(
            StatusCode::OK,
            b"<ListBucketResult><Name>b</Name><IsTruncated>false</IsTruncated>\
              <Contents><Key>obj1</Key><Size>5</Size><ETag>\"x\"</ETag></Contents>\
              </ListBucketResult>",
        );
        let listing = list_objects_page_verify(&res, "b").unwrap();
        assert!(!listing.is_truncated);
        assert_eq!(listing.contents.len(), 1);

        let err = list_objects_page_verify(&res, "other").unwrap_err();
        assert!(matches!(err, Mismatch::Body(ref d) if d.contains("other")));
    }

    #[test]
    fn test_truncated_page_needs_continuation_token() {
        let res = response(
            StatusCode::OK,
            b"<ListBucketResult><Name>b</Name><IsTruncated>true</IsTruncated>\
              <Contents><Key>obj1</Key><Size>5</Size></Contents></ListBucketResult>",
        );
        assert_eq!(
            list_objects_page_verify(&res, "b").unwrap_err(),
            Mismatch::Body("listing truncated without NextContinuationToken".to_string())
        );

        let res = response(
            StatusCode::OK,
            b"<ListBucketResult><Name>b</Name><IsTruncated>true</IsTruncated>\
              <NextContinuationToken>obj1</NextContinuationToken>\
              <Contents><Key>obj1</Key><Size>5</Size></Contents></ListBucketResult>",
        );
        let listing = list_objects_page_verify(&res, "b").unwrap();
        assert!(listing.is_truncated);
        assert_eq!(listing.next_continuation_token, "obj1");
    }

    #[test]
    fn test_listed_objects_across_pages() {
        // obj2 only shows up once the second page is appended.
        let hello = ObjectInfo::new("obj1", Bytes::from_static(b"hello"));
        let hi = ObjectInfo::new("obj2", Bytes::from_static(b"hi"));
        let mut listed = vec![entry("obj1", 5, "\"5d41402abc4b2a76b9719d911017c592\"")];
        assert_eq!(
            verify_listed_objects(&listed, &[hello.clone(), hi.clone()]).unwrap_err(),
            Mismatch::Body("object obj2 not listed".to_string())
        );

        listed.push(entry("obj2", 2, ""));
        verify_listed_objects(&listed, &[hello, hi]).unwrap();
    }

    #[test]
    fn test_listed_objects_checks_size_and_etag() {
        let hello = ObjectInfo::new("obj1", Bytes::from_static(b"hello"));

        let err = verify_listed_objects(&[entry("obj1", 4, "")], &[hello.clone()]).unwrap_err();
        assert!(matches!(err, Mismatch::Body(ref d) if d.contains("size 4")));

        let err = verify_listed_objects(&[entry("obj1", 5, "\"0000\"")], &[hello.clone()])
            .unwrap_err();
        assert!(matches!(err, Mismatch::Body(ref d) if d.contains("ETag")));

        // Multipart ETags are not an MD5 of the body.
        verify_listed_objects(&[entry("obj1", 5, "\"abc-2\"")], &[hello]).unwrap();
    }

    #[test]
    fn test_listing_that_is_an_error_document() {
        let res = response(StatusCode::OK, b"<Error><Code>AccessDenied</Code></Error>");
        assert!(matches!(
            list_buckets_verify(&res, &[]),
            Err(Mismatch::Body(_))
        ));
    }
}
