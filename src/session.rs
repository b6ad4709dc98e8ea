//! Signed `session` cookie.
//!
//! The session travels as two cookies: `session` holds base64-encoded JSON
//! (`{"jwt":"..."}` once a user has signed in) and `session.sig` holds an
//! HMAC-SHA256 tag over `session=<value>`. New cookies are signed with the
//! first configured key; any configured key is accepted when verifying, which
//! is what makes key rotation work. A cookie whose tag does not verify is
//! treated as no session at all.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use http::header::{COOKIE, HeaderMap, HeaderValue};
use parking_lot::Mutex;
use ring::hmac;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::error::Error;

pub const SESSION_COOKIE: &str = "session";
pub const SIGNATURE_COOKIE: &str = "session.sig";

/// One week.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const JWT_FIELD: &str = "jwt";

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct State {
    data: Map<String, Value>,
    changed: bool,
}

/// The decoded session of one request.
///
/// Cloning yields another handle to the same session, so the session layer
/// can see what a handler changed after the request has moved through the
/// pipeline.
#[derive(Clone, Default)]
pub struct Session {
    state: Arc<Mutex<State>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_map(data: Map<String, Value>) -> Self {
        Self { state: Arc::new(Mutex::new(State { data, changed: false })) }
    }

    /// The Session Credential, if one is present and non-empty.
    pub fn jwt(&self) -> Option<String> {
        self.get(JWT_FIELD)
            .and_then(|v| v.as_str().map(str::to_owned))
            .filter(|s| !s.is_empty())
    }

    pub fn set_jwt(&self, token: impl Into<String>) {
        self.insert(JWT_FIELD, Value::String(token.into()));
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().data.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let mut state = self.state.lock();
        state.data.insert(key.into(), value);
        state.changed = true;
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.state.lock();
        let removed = state.data.remove(key);
        if removed.is_some() {
            state.changed = true;
        }
        removed
    }

    /// Drops every field. The session layer answers with expired cookies.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if !state.data.is_empty() {
            state.data.clear();
            state.changed = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().data.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.state.lock().changed
    }

    fn to_json(&self) -> String {
        Value::Object(self.state.lock().data.clone()).to_string()
    }
}

// Field values may hold credentials; only the keys are printed.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("keys", &state.data.keys().collect::<Vec<_>>())
            .field("changed", &state.changed)
            .finish()
    }
}

// ── SessionCodec ──────────────────────────────────────────────────────────────

/// Reads and writes the signed session cookies.
pub struct SessionCodec {
    primary: hmac::Key,
    rotated: Vec<hmac::Key>,
    max_age: Duration,
    secure: bool,
}

impl SessionCodec {
    /// `keys[0]` signs; every key verifies.
    pub fn new(keys: &[SecretString], secure: bool) -> Result<Self, Error> {
        let mut keys = keys
            .iter()
            .map(|k| hmac::Key::new(hmac::HMAC_SHA256, k.expose_secret().as_bytes()));
        let primary = keys
            .next()
            .ok_or_else(|| Error::Config("at least one session signing key is required".into()))?;

        Ok(Self {
            primary,
            rotated: keys.collect(),
            max_age: DEFAULT_MAX_AGE,
            secure,
        })
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Extracts the session from the request's `Cookie` headers.
    pub fn decode(&self, headers: &HeaderMap) -> Session {
        let cookies = parse_cookies(headers);

        let Some(value) = cookies.get(SESSION_COOKIE) else {
            return Session::new();
        };
        let verified = cookies
            .get(SIGNATURE_COOKIE)
            .is_some_and(|sig| self.verify(value, sig));
        if !verified {
            debug!("ignoring session cookie with missing or invalid signature");
            return Session::new();
        }

        STANDARD
            .decode(value)
            .ok()
            .and_then(|raw| serde_json::from_slice::<Map<String, Value>>(&raw).ok())
            .map(Session::from_map)
            .unwrap_or_else(|| {
                debug!("ignoring undecodable session cookie");
                Session::new()
            })
    }

    /// `Set-Cookie` values re-issuing `session`, or expiring it when the
    /// session has been emptied.
    pub fn set_cookie_headers(&self, session: &Session) -> Vec<HeaderValue> {
        let lines = if session.is_empty() {
            let attrs = self.attributes(Duration::ZERO);
            vec![
                format!("{SESSION_COOKIE}=; {attrs}"),
                format!("{SIGNATURE_COOKIE}=; {attrs}"),
            ]
        } else {
            let value = STANDARD.encode(session.to_json());
            let sig = self.sign(&value);
            let attrs = self.attributes(self.max_age);
            vec![
                format!("{SESSION_COOKIE}={value}; {attrs}"),
                format!("{SIGNATURE_COOKIE}={sig}; {attrs}"),
            ]
        };

        lines
            .into_iter()
            .filter_map(|line| match HeaderValue::try_from(line) {
                Ok(v) => Some(v),
                Err(e) => {
                    error!(error = %e, "failed to build session cookie header");
                    None
                }
            })
            .collect()
    }

    /// A `Cookie` request-header value carrying `session` signed with the
    /// primary key. Used by internal callers and tests that need to present
    /// a session the way a browser would.
    pub fn seal(&self, session: &Session) -> String {
        let value = STANDARD.encode(session.to_json());
        let sig = self.sign(&value);
        format!("{SESSION_COOKIE}={value}; {SIGNATURE_COOKIE}={sig}")
    }

    fn attributes(&self, max_age: Duration) -> String {
        let mut attrs = format!("Path=/; Max-Age={}; HttpOnly; SameSite=Lax", max_age.as_secs());
        if self.secure {
            attrs.push_str("; Secure");
        }
        attrs
    }

    fn sign(&self, value: &str) -> String {
        let tag = hmac::sign(&self.primary, signed_payload(value).as_bytes());
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    }

    fn verify(&self, value: &str, sig: &str) -> bool {
        let Ok(tag) = URL_SAFE_NO_PAD.decode(sig) else {
            return false;
        };
        let payload = signed_payload(value);
        std::iter::once(&self.primary)
            .chain(&self.rotated)
            .any(|key| hmac::verify(key, payload.as_bytes(), &tag).is_ok())
    }
}

fn signed_payload(value: &str) -> String {
    format!("{SESSION_COOKIE}={value}")
}

/// First occurrence of each cookie name wins.
fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in headers.get_all(COOKIE) {
        let Ok(header) = header.to_str() else { continue };
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                cookies
                    .entry(name.trim().to_owned())
                    .or_insert_with(|| value.trim().to_owned());
            }
        }
    }
    cookies
}
