//! # frontdoor
//!
//! The front door of a microservice topology. It terminates browser session
//! traffic, authenticates it, and signs the calls it makes to internal
//! services.
//!
//! ## What it owns
//!
//! - **Session authentication**: a signed `session` cookie carries the user's
//!   credential; [`SessionAuthenticator`] verifies it and route guards
//!   require it.
//! - **Service credentials**: every outbound client carries a `gatewaytoken`
//!   header minted by [`ServiceTokenIssuer`].
//! - **Readiness**: [`ReadinessGate`] holds startup until the search index
//!   answers its cluster-health endpoint.
//! - **Pipeline**: session, security headers, CORS, compression and body
//!   limits in a fixed order, ending in the route table and a not-found
//!   fallback.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use clap::Parser;
//! use frontdoor::{Gateway, config::Args};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Args::parse().into_config()?;
//!     Gateway::new(config)?.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! Handlers are plain async functions:
//!
//! ```rust,no_run
//! use frontdoor::{ApiError, Request, Response, auth::require_identity};
//!
//! async fn whoami(req: Request) -> Result<Response, ApiError> {
//!     let identity = require_identity(&req)?;
//!     Ok(Response::builder().json_value(identity))
//! }
//! ```

mod handler;
mod pipeline;
mod request;
mod response;
mod router;
mod server;

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod readiness;
pub mod routes;
pub mod service_token;
pub mod session;

pub use auth::{IdentityPayload, SessionAuthenticator};
pub use error::{ApiError, Error};
pub use gateway::Gateway;
pub use handler::{Endpoint, Handler};
pub use pipeline::Pipeline;
pub use readiness::{ClusterHealth, Readiness, ReadinessGate};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Server, serve_with_listener, shutdown_signal};
pub use service_token::{OutboundClient, ServiceClients, ServiceCredential, ServiceTokenIssuer};
pub use session::{Session, SessionCodec};
