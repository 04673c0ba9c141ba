//! The S3 endpoint under test and the request executor.
//!
//! [`ServerConfig`] is built once per run and never mutated.  Its
//! [`exec_request`](ServerConfig::exec_request) signs a [`Request`], sends
//! it, and reads the response body to completion before returning, so the
//! connection goes back to the pool no matter how verification ends.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Url;
use tracing::debug;

use crate::auth::{s3_uri_encode, RequestSigner, SigV4Signer};
use crate::config::Config;
use crate::errors::HarnessError;
use crate::request::Request;

/// Connection details for the target endpoint.
#[derive(Clone)]
pub struct ServerConfig {
    /// Base URL; buckets are addressed path-style beneath it.
    pub endpoint: Url,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub client: reqwest::Client,
    signer: Arc<dyn RequestSigner>,
    timeout: Option<Duration>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .field("signer", &self.signer)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Target `endpoint` with SigV4 credentials.
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> Result<Self, HarnessError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| HarnessError::InvalidRequest(format!("invalid URL {endpoint:?}: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.host_str().is_none() {
            return Err(HarnessError::InvalidRequest(format!(
                "URL must be http(s)://host[:port], got {endpoint}"
            )));
        }
        Ok(Self {
            endpoint,
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            region: region.to_string(),
            client: reqwest::Client::new(),
            signer: Arc::new(SigV4Signer::new(access_key, secret_key, region)),
            timeout: None,
        })
    }

    /// Build from the resolved configuration.
    pub fn from_config(config: &Config) -> Result<Self, HarnessError> {
        let server = Self::new(
            &config.target.url,
            &config.target.access_key,
            &config.target.secret_key,
            &config.target.region,
        )?;
        Ok(match config.run.timeout_secs {
            Some(secs) => server.with_timeout(Duration::from_secs(secs)),
            None => server,
        })
    }

    /// Replace the request signer.
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Give up on any single request after `timeout`.  Without this a hung
    /// target blocks the run indefinitely.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Path-style URL for `req`: `/{bucket}/{key}?{query}`.
    pub fn target_url(&self, req: &Request) -> Result<Url, HarnessError> {
        let mut path = String::from("/");
        if !req.bucket_name.is_empty() {
            path.push_str(&s3_uri_encode(&req.bucket_name, true));
            if let Some(key) = &req.object_name {
                if key.is_empty() {
                    return Err(HarnessError::InvalidRequest(
                        "object name must not be empty".to_string(),
                    ));
                }
                path.push('/');
                path.push_str(&s3_uri_encode(key, false));
            }
        } else if req.object_name.is_some() {
            return Err(HarnessError::InvalidRequest(
                "object requests need a bucket name".to_string(),
            ));
        }

        let mut url = self.endpoint.clone();
        url.set_path(&path);
        if req.query.is_empty() {
            url.set_query(None);
        } else {
            let query = req
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", s3_uri_encode(k, true), s3_uri_encode(v, true)))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
        Ok(url)
    }

    /// Sign and send `req`, returning the fully-read response.
    pub async fn exec_request(
        &self,
        method: Method,
        req: &Request,
    ) -> Result<ServerResponse, HarnessError> {
        let url = self.target_url(req)?;
        let mut headers = req.custom_headers.clone();
        self.signer
            .sign(&method, &url, &mut headers, req.payload_hash(), Utc::now())?;

        debug!(%method, %url, "sending request");
        let send = async {
            let res = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers)
                .body(req.body.clone())
                .send()
                .await?;
            let status = res.status();
            let headers = res.headers().clone();
            let body = res.bytes().await?;
            Ok::<_, reqwest::Error>(ServerResponse {
                status,
                headers,
                body,
            })
        };

        let res = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| HarnessError::Timeout(limit))??,
            None => send.await?,
        };
        debug!(%method, %url, status = %res.status, bytes = res.body.len(), "received response");
        Ok(res)
    }
}

/// A response whose body has already been read and released.
#[derive(Debug, Clone)]
pub struct ServerResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ServerResponse {
    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{
        new_get_object_range_req, new_list_buckets_req, new_list_objects_req,
        new_remove_bucket_req,
    };
    use std::sync::Mutex;

    fn server() -> ServerConfig {
        ServerConfig::new("http://127.0.0.1:9000", "ak", "sk", "us-east-1").unwrap()
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        assert!(ServerConfig::new("not a url", "ak", "sk", "us-east-1").is_err());
        assert!(ServerConfig::new("ftp://host", "ak", "sk", "us-east-1").is_err());
    }

    #[test]
    fn test_target_url_service() {
        let url = server().target_url(&new_list_buckets_req().unwrap()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn test_target_url_bucket_and_key() {
        let req = new_get_object_range_req("bucket", "dir/my file.txt", 0, 1).unwrap();
        let url = server().target_url(&req).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/bucket/dir/my%20file.txt");

        let url = server().target_url(&new_remove_bucket_req("bucket").unwrap()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/bucket");
    }

    #[test]
    fn test_target_url_query() {
        let url = server().target_url(&new_list_objects_req("bucket", None).unwrap()).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/bucket?list-type=2");

        let req = new_list_objects_req("bucket", Some("1/a b=")).unwrap();
        let url = server().target_url(&req).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/bucket?list-type=2&continuation-token=1%2Fa%20b%3D"
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let server = ServerConfig::new("http://h:1", "ak", "very-secret", "r").unwrap();
        assert!(!format!("{server:?}").contains("very-secret"));
    }

    #[derive(Debug, Default)]
    struct RecordingSigner {
        calls: Mutex<Vec<(Method, String, String)>>,
    }

    impl RequestSigner for RecordingSigner {
        fn sign(
            &self,
            method: &Method,
            url: &Url,
            _headers: &mut HeaderMap,
            payload_hash: &str,
            _now: chrono::DateTime<Utc>,
        ) -> Result<(), HarnessError> {
            self.calls.lock().unwrap().push((
                method.clone(),
                url.to_string(),
                payload_hash.to_string(),
            ));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_exec_request_transport_error_after_signing() {
        // Grab a free port and close it again so the connection is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let signer = Arc::new(RecordingSigner::default());
        let server = ServerConfig::new(&format!("http://{addr}"), "ak", "sk", "us-east-1")
            .unwrap()
            .with_signer(signer.clone());

        let req = new_remove_bucket_req("bucket").unwrap();
        let err = server.exec_request(Method::DELETE, &req).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");

        let calls = signer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Method::DELETE);
        assert_eq!(calls[0].1, format!("http://{addr}/bucket"));
        assert_eq!(calls[0].2, crate::hash::EMPTY_SHA256);
    }

    #[tokio::test]
    async fn test_exec_request_times_out_on_silent_server() {
        // Accept connections and hold them open without ever answering.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let limit = Duration::from_millis(200);
        let server = ServerConfig::new(&format!("http://{addr}"), "ak", "sk", "us-east-1")
            .unwrap()
            .with_timeout(limit);

        let req = new_list_buckets_req().unwrap();
        let err = server.exec_request(Method::GET, &req).await.unwrap_err();
        assert!(matches!(err, HarnessError::Timeout(d) if d == limit), "unexpected error: {err}");
        assert!(err.is_transport());
    }
}
