//! The gateway front door: composition root and lifecycle.
//!
//! [`Gateway::build`] assembles the pipeline in a fixed order and only
//! returns once the search index is reachable:
//!
//! 1. security policy: cookie session, parameter-pollution guard, hardening
//!    headers, CORS
//! 2. standard middleware: compression, body limit / JSON validation
//! 3. the route table
//! 4. the readiness gate
//! 5. the not-found fallback
//!
//! [`Gateway::start`] then binds the listener. No request can reach a handler
//! before step 4 has completed.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::auth::SessionAuthenticator;
use crate::config::Config;
use crate::error::{ApiError, Error};
use crate::middleware::{BodyParser, Compression, Cors, ParameterPollution, SecurityHeaders, SessionLayer};
use crate::pipeline::Pipeline;
use crate::readiness::{ClusterHealth, ElasticsearchHealth, ReadinessGate};
use crate::request::Request;
use crate::routes;
use crate::server::{Server, shutdown_signal};
use crate::service_token::{ServiceClients, ServiceTokenIssuer};
use crate::session::SessionCodec;

/// Builds the health probe the readiness gate polls.
pub type HealthFactory =
    Box<dyn Fn(&Config) -> Result<Box<dyn ClusterHealth>, Error> + Send + Sync>;

pub struct Gateway {
    config: Config,
    auth: Arc<SessionAuthenticator>,
    sessions: Arc<SessionCodec>,
    services: ServiceClients,
    health: HealthFactory,
    readiness: OnceCell<Arc<ReadinessGate>>,
}

impl Gateway {
    /// Gateway probing the configured Elasticsearch cluster.
    pub fn new(config: Config) -> Result<Self, Error> {
        Self::with_health_check(
            config,
            Box::new(|config: &Config| {
                let health = ElasticsearchHealth::new(&config.elastic_search_url, config.health_timeout)?;
                Ok::<_, Error>(Box::new(health) as Box<dyn ClusterHealth>)
            }),
        )
    }

    pub fn with_health_check(config: Config, health: HealthFactory) -> Result<Self, Error> {
        let auth = Arc::new(SessionAuthenticator::new(&config.jwt_token));
        let sessions = Arc::new(
            SessionCodec::new(&config.session_keys, config.is_production())?
                .with_max_age(config.session_max_age),
        );

        let mut issuer = ServiceTokenIssuer::new(&config.gateway_jwt_token);
        if let Some(ttl) = config.service_token_ttl {
            issuer = issuer.with_ttl(ttl);
        }
        let services = ServiceClients::from_config(&issuer, &config.services)?;

        Ok(Self { config, auth, sessions, services, health, readiness: OnceCell::new() })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Outbound clients for the downstream services.
    pub fn services(&self) -> &ServiceClients {
        &self.services
    }

    /// The process's readiness gate.
    ///
    /// The first call builds it; every later call returns the same instance.
    /// The health probe is constructed at most once.
    pub fn readiness(&self) -> Result<Arc<ReadinessGate>, Error> {
        self.readiness
            .get_or_try_init(|| {
                let health = (self.health)(&self.config)?;
                Ok::<_, Error>(Arc::new(ReadinessGate::new(health)))
            })
            .map(Arc::clone)
    }

    /// Assembles the request pipeline. Waits for the search index.
    pub async fn build(&self) -> Result<Pipeline, Error> {
        let pipeline = Pipeline::new().body_limit(self.config.body_limit);
        let pipeline = self.security_middleware(pipeline)?;
        let pipeline = self.standard_middleware(pipeline);

        let gate = self.readiness()?;
        let pipeline = pipeline.routes(routes::router(Arc::clone(&self.auth), gate.subscribe()));

        let attempts = gate.await_ready().await;
        info!(attempts, "search index reachable, gateway ready");

        Ok(pipeline.fallback(not_found))
    }

    /// Builds the pipeline, then serves until shutdown.
    ///
    /// A shutdown signal while waiting for readiness returns `Ok` without
    /// binding.
    pub async fn start(self) -> Result<(), Error> {
        let pipeline = tokio::select! {
            built = self.build() => built?,
            () = shutdown_signal() => {
                info!("shutdown requested before the gateway became ready");
                return Ok(());
            }
        };

        info!(addr = %self.config.listen, "gateway server starting");
        Server::bind(self.config.listen)
            .serve(pipeline)
            .await
            .inspect_err(|e| error!(error = %e, "gateway server failed"))
    }

    fn security_middleware(&self, pipeline: Pipeline) -> Result<Pipeline, Error> {
        Ok(pipeline
            .layer(SessionLayer::new(Arc::clone(&self.sessions)))
            .layer(ParameterPollution)
            .layer(SecurityHeaders)
            .layer(Cors::new(&self.config.client_url)?))
    }

    fn standard_middleware(&self, pipeline: Pipeline) -> Pipeline {
        pipeline
            .layer(Compression::with_threshold(self.config.compression_threshold))
            .layer(BodyParser)
    }
}

async fn not_found(req: Request) -> ApiError {
    ApiError::RouteNotFound { url: req.full_url() }
}
