//! S3 XML documents.
//!
//! Response bodies are decoded with `quick-xml`'s serde support after the
//! root element has been checked, so that a listing document is never
//! mistaken for an `<Error>` (or vice versa).  The `<Error>` document can
//! also be rendered, which is how expected errors are shown in reports.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Why a body could not be decoded as the expected document.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("response body is empty")]
    Empty,

    #[error("response body is not UTF-8")]
    NotUtf8,

    #[error("expected <{expected}> document, found <{found}>")]
    UnexpectedRoot { expected: String, found: String },

    #[error("no root element in response body")]
    NoRoot,

    #[error("malformed XML: {0}")]
    Malformed(#[from] quick_xml::DeError),
}

// ── Decoding ────────────────────────────────────────────────────────

/// Name of the first element in `body`, skipping the declaration,
/// comments and whitespace.
pub fn root_element(body: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Decode `body` as a document whose root element is `root`.
pub fn parse_document<T: DeserializeOwned>(body: &[u8], root: &str) -> Result<T, XmlError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(XmlError::Empty);
    }
    let text = std::str::from_utf8(body).map_err(|_| XmlError::NotUtf8)?;
    let found = root_element(body).ok_or(XmlError::NoRoot)?;
    if found != root {
        return Err(XmlError::UnexpectedRoot {
            expected: root.to_string(),
            found,
        });
    }
    Ok(quick_xml::de::from_str(text)?)
}

/// Fields of an S3 `<Error>` document.  Every element is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ErrorDocument {
    pub code: String,
    pub message: String,
    pub bucket_name: String,
    pub key: String,
    pub request_id: String,
    pub host_id: String,
}

/// `<ListAllMyBucketsResult>` returned by `GET /`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListAllMyBucketsResult {
    pub buckets: BucketList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BucketList {
    #[serde(rename = "Bucket")]
    pub bucket: Vec<BucketEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BucketEntry {
    pub name: String,
}

/// One `<ListBucketResult>` page returned by ListObjectsV2.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListBucketResult {
    pub name: String,
    pub is_truncated: bool,
    /// Set when `is_truncated`; passed back as `continuation-token`.
    pub next_continuation_token: String,
    pub contents: Vec<ObjectEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    #[serde(rename = "ETag")]
    pub etag: String,
}

// ── Rendering ───────────────────────────────────────────────────────

/// Render an S3 `<Error>` XML document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>AccessDenied</Code>
///   <Message>Access Denied</Message>
///   <BucketName>bucketName</BucketName>
///   <Key>objectName</Key>
///   <RequestId>F19772218238A85A</RequestId>
///   <HostId>GuWkjyviSiGHizehqpmsD1ndz5NClSP19DOT+s2mv7gXGQ8/X1lhbDGiIJEXpGFD</HostId>
/// </Error>
/// ```
pub fn render_error(doc: &ErrorDocument) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .expect("xml decl");

    write_simple_element_group(
        &mut writer,
        "Error",
        &[
            ("Code", doc.code.as_str()),
            ("Message", doc.message.as_str()),
            ("BucketName", doc.bucket_name.as_str()),
            ("Key", doc.key.as_str()),
            ("RequestId", doc.request_id.as_str()),
            ("HostId", doc.host_id.as_str()),
        ],
    );

    String::from_utf8(writer.into_inner().into_inner()).expect("valid utf-8")
}

fn write_simple_element_group(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    children: &[(&str, &str)],
) {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .expect("start group");
    for (child, value) in children {
        write_text_element(writer, child, value);
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .expect("end group");
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, value: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .expect("start element");
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .expect("text");
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .expect("end element");
}
