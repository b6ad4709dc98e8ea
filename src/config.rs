//! Configuration
//!
//! CLI arguments with environment-variable fallbacks, parsed once at startup
//! into a [`Config`] that is passed by reference to every component. Signing
//! secrets are held as [`SecretString`] from that point on.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

// One fixed value per secret class, so development never mixes them.
const DEV_USER_SESSION_SECRET: &str = "dev-only-user-session-secret";
const DEV_SERVICE_SECRET: &str = "dev-only-service-secret";
const DEV_COOKIE_KEY: &str = "dev-only-cookie-key";

/// Deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Development,
    Production,
}

/// Gateway front door for the microservice topology
#[derive(Parser, Clone)]
#[command(name = "frontdoor")]
#[command(about = "Session-authenticating API gateway")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:4000")]
    pub listen: SocketAddr,

    /// Search index base URL, probed before the gateway starts routing
    #[arg(long, env = "ELASTIC_SEARCH_URL", default_value = "http://localhost:9200")]
    pub elastic_search_url: String,

    /// Secret for verifying user Session Credentials
    #[arg(long, env = "JWT_TOKEN")]
    pub jwt_token: Option<String>,

    /// Secret for signing service-to-service credentials
    #[arg(long, env = "GATEWAY_JWT_TOKEN")]
    pub gateway_jwt_token: Option<String>,

    /// Primary session cookie signing key
    #[arg(long, env = "SECRET_KEY_ONE")]
    pub secret_key_one: Option<String>,

    /// Previous session cookie signing key, still accepted while rotating
    #[arg(long, env = "SECRET_KEY_TWO")]
    pub secret_key_two: Option<String>,

    /// Browser client origin allowed by CORS
    #[arg(long, env = "CLIENT_URL", default_value = "http://localhost:3000")]
    pub client_url: String,

    /// Deployment mode
    #[arg(long, env = "NODE_ENV", value_enum, default_value = "development")]
    pub environment: Environment,

    #[command(flatten)]
    pub services: DownstreamUrls,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "BODY_LIMIT_BYTES", default_value_t = 200 * 1024 * 1024)]
    pub body_limit_bytes: usize,

    /// Timeout of one search-index health probe, in milliseconds
    #[arg(long, env = "HEALTH_TIMEOUT_MS", default_value_t = 5000)]
    pub health_timeout_ms: u64,

    /// Lifetime of the session cookie, in seconds
    #[arg(long, env = "SESSION_MAX_AGE_SECS", default_value_t = 7 * 24 * 60 * 60)]
    pub session_max_age_secs: u64,

    /// Smallest response body worth compressing, in bytes
    #[arg(long, env = "COMPRESSION_THRESHOLD_BYTES", default_value_t = 1024)]
    pub compression_threshold_bytes: usize,

    /// Lifetime of service credentials in seconds; unset means no expiry claim
    #[arg(long, env = "SERVICE_TOKEN_TTL_SECS")]
    pub service_token_ttl_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

/// Base URLs of downstream services
#[derive(clap::Args, Debug, Clone, Default)]
pub struct DownstreamUrls {
    #[arg(long, env = "AUTH_BASE_URL")]
    pub auth_base_url: Option<String>,

    /// Serves both the buyer and seller clients
    #[arg(long, env = "USERS_BASE_URL")]
    pub users_base_url: Option<String>,

    #[arg(long, env = "GIG_BASE_URL")]
    pub gig_base_url: Option<String>,

    #[arg(long, env = "MESSAGE_BASE_URL")]
    pub message_base_url: Option<String>,

    #[arg(long, env = "ORDER_BASE_URL")]
    pub order_base_url: Option<String>,

    #[arg(long, env = "REVIEW_BASE_URL")]
    pub review_base_url: Option<String>,
}

impl DownstreamUrls {
    /// `(client name, base url)` for every configured service.
    pub fn configured(&self) -> Vec<(&'static str, &str)> {
        [
            ("auth", &self.auth_base_url),
            ("buyer", &self.users_base_url),
            ("seller", &self.users_base_url),
            ("gig", &self.gig_base_url),
            ("message", &self.message_base_url),
            ("order", &self.order_base_url),
            ("review", &self.review_base_url),
        ]
        .into_iter()
        .filter_map(|(name, url)| url.as_deref().map(|url| (name, url)))
        .collect()
    }
}

// Secrets stay out of debug output.
impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("listen", &self.listen)
            .field("elastic_search_url", &self.elastic_search_url)
            .field("client_url", &self.client_url)
            .field("environment", &self.environment)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Validated process configuration. Immutable after startup.
#[derive(Debug)]
pub struct Config {
    pub listen: SocketAddr,
    pub elastic_search_url: String,
    pub jwt_token: SecretString,
    pub gateway_jwt_token: SecretString,
    /// Signing key first, then keys still accepted for verification.
    pub session_keys: Vec<SecretString>,
    pub client_url: String,
    pub environment: Environment,
    pub services: DownstreamUrls,
    pub body_limit: usize,
    pub health_timeout: Duration,
    pub session_max_age: Duration,
    pub compression_threshold: usize,
    pub service_token_ttl: Option<Duration>,
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl Args {
    /// Validates and converts into a [`Config`].
    ///
    /// Production requires every secret. Development substitutes a fixed
    /// insecure value for missing ones, distinct per secret. The user-session
    /// and service secrets must differ in every mode.
    pub fn into_config(self) -> Result<Config, Error> {
        let production = self.environment == Environment::Production;

        let secret = |value: Option<String>, name: &str| -> Result<Option<SecretString>, Error> {
            match value.filter(|v| !v.trim().is_empty()) {
                Some(v) => Ok(Some(SecretString::from(v))),
                None if production => Err(Error::Config(format!("{name} is required in production mode"))),
                None => Ok(None),
            }
        };
        let jwt_token = secret(self.jwt_token, "JWT_TOKEN")?
            .unwrap_or_else(|| SecretString::from(DEV_USER_SESSION_SECRET));
        let gateway_jwt_token = secret(self.gateway_jwt_token, "GATEWAY_JWT_TOKEN")?
            .unwrap_or_else(|| SecretString::from(DEV_SERVICE_SECRET));
        let key_one = secret(self.secret_key_one, "SECRET_KEY_ONE")?
            .unwrap_or_else(|| SecretString::from(DEV_COOKIE_KEY));
        let key_two = self
            .secret_key_two
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::from);

        // A service credential must never verify as a user session.
        if jwt_token.expose_secret() == gateway_jwt_token.expose_secret() {
            return Err(Error::Config(
                "JWT_TOKEN and GATEWAY_JWT_TOKEN must differ".into(),
            ));
        }
        if self.client_url.trim().is_empty() {
            return Err(Error::Config("CLIENT_URL must not be empty".into()));
        }
        if self.body_limit_bytes == 0 {
            return Err(Error::Config("BODY_LIMIT_BYTES must be positive".into()));
        }

        Ok(Config {
            listen: self.listen,
            elastic_search_url: self.elastic_search_url,
            jwt_token,
            gateway_jwt_token,
            session_keys: std::iter::once(key_one).chain(key_two).collect(),
            client_url: self.client_url,
            environment: self.environment,
            services: self.services,
            body_limit: self.body_limit_bytes,
            health_timeout: Duration::from_millis(self.health_timeout_ms),
            session_max_age: Duration::from_secs(self.session_max_age_secs),
            compression_threshold: self.compression_threshold_bytes,
            service_token_ttl: self.service_token_ttl_secs.map(Duration::from_secs),
        })
    }
}
