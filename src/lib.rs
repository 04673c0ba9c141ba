//! s3verify library: conformance checks for S3-compatible endpoints.
//!
//! Requests are built per operation ([`request`]), signed and sent
//! ([`server`]), and their responses checked header, status and body in
//! turn ([`verify`]).  Error bodies decode through [`error_response`],
//! which falls back to the status code when the XML is missing.  The
//! buckets and objects used as oracles live in [`fixtures`], and
//! [`runner`] executes the [`cases`] in order.

pub mod auth;
pub mod cases;
pub mod config;
pub mod error_response;
pub mod errors;
pub mod fixtures;
pub mod hash;
pub mod request;
pub mod runner;
pub mod server;
pub mod verify;
pub mod xml;

pub use error_response::{ErrorCode, ErrorResponse};
pub use errors::HarnessError;
pub use runner::{RunSummary, TestCase, TestContext, TestRunner};
pub use server::{ServerConfig, ServerResponse};
