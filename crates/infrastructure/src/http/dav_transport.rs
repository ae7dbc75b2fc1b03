//! Resilient HTTP transport for DAV requests
//!
//! One pooled `reqwest::Client` is shared by all requests. Each attempt goes
//! through the circuit breaker of the target host, and failed attempts are
//! retried according to the request's [`RequestKind`].

use std::{collections::HashMap, fmt, sync::Arc};

use application::{
    DavError, DavRequest, DavResponse, RequestContext, TransportFailure, TransportPort,
    ports::{DavMethod, headers},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, Url};
use tracing::{debug, instrument};

use crate::{
    adapters::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState},
    config::{AppConfig, TransportConfig},
    retry::{RetryConfig, with_retry},
};

/// `TransportPort` adapter on top of reqwest
pub struct HttpDavTransport {
    client: Client,
    retry: RetryConfig,
    breaker_config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl fmt::Debug for HttpDavTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDavTransport")
            .field("retry", &self.retry)
            .field("breaker_config", &self.breaker_config)
            .field("hosts", &self.breakers.read().len())
            .finish_non_exhaustive()
    }
}

impl HttpDavTransport {
    /// Create a transport
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailure` if the proxy URL is invalid or the client
    /// cannot be built.
    pub fn new(
        transport: &TransportConfig,
        retry: RetryConfig,
        breaker_config: CircuitBreakerConfig,
    ) -> Result<Self, DavError> {
        let mut builder = Client::builder()
            .timeout(transport.timeout())
            .connect_timeout(transport.connect_timeout())
            .pool_max_idle_per_host(transport.pool_max_idle_per_host)
            .pool_idle_timeout(transport.pool_idle_timeout())
            .user_agent(&transport.user_agent)
            .danger_accept_invalid_certs(!transport.verify_certs);

        if let Some(proxy) = transport.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| DavError::ValidationFailure(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            DavError::ValidationFailure(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            retry,
            breaker_config,
            breakers: RwLock::new(HashMap::new()),
        })
    }

    /// Create a transport from the application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, DavError> {
        Self::new(
            &config.transport,
            config.retry.clone(),
            CircuitBreakerConfig::from(&config.circuit_breaker),
        )
    }

    /// Breaker state for the host of `url`, if any request has gone there
    #[must_use]
    pub fn circuit_state(&self, url: &str) -> Option<CircuitState> {
        let host = host_key(url).ok()?;
        self.breakers.read().get(&host).map(|b| b.state())
    }

    fn breaker_for(&self, host: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(host) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write();
        Arc::clone(breakers.entry(host.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::with_config(
                host,
                self.breaker_config.clone(),
            ))
        }))
    }

    /// One attempt, no retry; 5xx answers become errors
    async fn send_once(
        &self,
        ctx: &RequestContext,
        request: &DavRequest,
    ) -> Result<DavResponse, DavError> {
        let mut builder = self
            .client
            .request(method_for(request.method)?, &request.url)
            .basic_auth(
                ctx.credentials().username(),
                Some(ctx.credentials().password()),
            )
            .header(headers::X_REQUEST_ID, ctx.request_id().to_string());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let response_headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(map_reqwest_error)?;

        debug!(
            method = %request.method,
            url = %request.url,
            status = status,
            "DAV response"
        );

        if status >= 500 {
            return Err(DavError::transport(
                TransportFailure::Status(status),
                format!("{} {} answered {status}", request.method, request.url),
            ));
        }

        Ok(DavResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

#[async_trait]
impl TransportPort for HttpDavTransport {
    #[instrument(
        skip(self, ctx, request),
        fields(method = %request.method, url = %request.url, request_id = %ctx.request_id())
    )]
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: DavRequest,
    ) -> Result<DavResponse, DavError> {
        let host = host_key(&request.url)?;
        let breaker = self.breaker_for(&host);
        let kind = request.kind();

        let breaker = &breaker;
        let request = &request;
        let outcome = with_retry(&self.retry, kind, || async move {
            breaker
                .call(|| self.send_once(ctx, request))
                .await
                .map_err(|err| match err {
                    CircuitBreakerError::CircuitOpen(open) => {
                        DavError::CircuitOpen { host: open.host }
                    },
                    CircuitBreakerError::ServiceError(e) => e,
                })
        })
        .await;

        debug!(
            attempts = outcome.attempts,
            duration_ms = u64::try_from(outcome.total_duration.as_millis()).unwrap_or(u64::MAX),
            ok = outcome.is_ok(),
            "DAV request finished"
        );
        outcome.into_result()
    }
}

fn method_for(method: DavMethod) -> Result<Method, DavError> {
    match method {
        DavMethod::Get => Ok(Method::GET),
        DavMethod::Put => Ok(Method::PUT),
        DavMethod::Delete => Ok(Method::DELETE),
        DavMethod::Report | DavMethod::Propfind => Method::from_bytes(method.as_str().as_bytes())
            .map_err(|e| DavError::transport(TransportFailure::Other, e.to_string())),
    }
}

/// Breaker key: `host:port` of an absolute URL
fn host_key(url: &str) -> Result<String, DavError> {
    let parsed = Url::parse(url)
        .map_err(|e| DavError::ValidationFailure(format!("invalid URL '{url}': {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| DavError::ValidationFailure(format!("URL '{url}' has no host")))?;
    Ok(match parsed.port_or_known_default() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn map_reqwest_error(err: reqwest::Error) -> DavError {
    let kind = if err.is_connect() {
        TransportFailure::Connect
    } else if err.is_timeout() {
        TransportFailure::Timeout
    } else {
        TransportFailure::Other
    };
    DavError::transport(kind, err.to_string())
}
