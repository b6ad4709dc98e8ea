//! Response compression.

use std::io::Write;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::Compression as Level;
use flate2::write::GzEncoder;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue, VARY};
use tracing::debug;

use crate::error::ApiError;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Bodies smaller than this are sent as-is.
pub const DEFAULT_THRESHOLD: usize = 1024;

/// Gzips textual response bodies for clients that accept it.
pub struct Compression {
    threshold: usize,
}

impl Compression {
    pub fn new() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }

    pub fn with_threshold(threshold: usize) -> Self {
        Self { threshold }
    }

    fn should_compress(&self, res: &Response) -> bool {
        if res.body().len() < self.threshold || res.headers().contains_key(CONTENT_ENCODING) {
            return false;
        }
        res.headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_compressible)
    }
}

impl Default for Compression {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Middleware for Compression {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let gzip_ok = req.header(ACCEPT_ENCODING.as_str()).is_some_and(accepts_gzip);

        let mut res = next.run(req).await;
        res.headers_mut().append(VARY, HeaderValue::from_static("accept-encoding"));
        if !gzip_ok || !self.should_compress(&res) {
            return Ok(res);
        }

        match gzip(res.body()) {
            Ok(compressed) => {
                res.set_body(compressed);
                res.headers_mut().insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                res.headers_mut().remove(CONTENT_LENGTH);
            }
            Err(e) => debug!(error = %e, "gzip failed, sending uncompressed"),
        }
        Ok(res)
    }
}

/// Whether an `Accept-Encoding` value allows gzip. `q=0` means refused.
fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|item| {
        let mut parts = item.split(';');
        let coding = parts.next().unwrap_or("").trim();
        if !coding.eq_ignore_ascii_case("gzip") && coding != "*" {
            return false;
        }
        let quality = parts
            .filter_map(|param| {
                let (key, value) = param.split_once('=')?;
                key.trim().eq_ignore_ascii_case("q").then(|| value.trim().parse::<f32>().ok())?
            })
            .next()
            .unwrap_or(1.0);
        quality > 0.0
    })
}

fn is_compressible(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    essence.starts_with("text/")
        || essence.ends_with("json")
        || essence.ends_with("javascript")
        || essence.ends_with("xml")
}

fn gzip(body: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Level::default());
    encoder.write_all(body)?;
    Ok(Bytes::from(encoder.finish()?))
}
