//! Cookie session layer.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::SET_COOKIE;

use crate::error::ApiError;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::session::SessionCodec;

/// Decodes the signed session cookie into the request and re-issues it when
/// a handler changed the session.
pub struct SessionLayer {
    codec: Arc<SessionCodec>,
}

impl SessionLayer {
    pub fn new(codec: Arc<SessionCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl Middleware for SessionLayer {
    async fn handle(&self, mut req: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let session = self.codec.decode(req.headers());
        req.session = session.clone();

        let mut res = next.run(req).await;
        if session.is_changed() {
            for cookie in self.codec.set_cookie_headers(&session) {
                res.headers_mut().append(SET_COOKIE, cookie);
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Layer;
    use crate::router::Router;
    use crate::session::Session;
    use http::header::{COOKIE, HeaderValue};
    use http::{Method, StatusCode};
    use secrecy::SecretString;

    fn codec() -> Arc<SessionCodec> {
        Arc::new(SessionCodec::new(&[SecretString::from("key-one")], false).unwrap())
    }

    async fn run(codec: Arc<SessionCodec>, req: Request) -> Response {
        let chain: Vec<Layer> = vec![Arc::new(SessionLayer::new(codec))];
        let router = Router::new()
            .get("/read", |req: Request| async move {
                Response::text(req.session().jwt().unwrap_or_default())
            })
            .post("/signout", |req: Request| async move {
                req.session().clear();
                StatusCode::OK
            });
        Next::new(&chain, &router).run(req).await
    }

    fn with_cookie(method: Method, path: &str, cookie: &str) -> Request {
        let mut req = Request::for_test(method, path);
        req.parts.headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        req
    }

    #[tokio::test]
    async fn handler_sees_decoded_session_and_no_cookie_is_reissued() {
        let codec = codec();
        let session = Session::new();
        session.set_jwt("abc");
        let res = run(Arc::clone(&codec), with_cookie(Method::GET, "/read", &codec.seal(&session))).await;

        assert_eq!(res.body().as_ref(), b"abc");
        assert!(res.headers().get(SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn cleared_session_expires_cookies() {
        let codec = codec();
        let session = Session::new();
        session.set_jwt("abc");
        let res = run(Arc::clone(&codec), with_cookie(Method::POST, "/signout", &codec.seal(&session))).await;

        let cookies: Vec<_> = res.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].to_str().unwrap().starts_with("session=;"));
    }
}
