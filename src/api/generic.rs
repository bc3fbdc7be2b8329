//! Generic API structures and server
//!
//! This module contains the response envelope, filter helpers, the rejection
//! handler and the `ApiServer` that wires the routes together.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, info};
use warp::hyper::body::Bytes;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use crate::config::Config;
use crate::monitor::ImmediateChecker;

// ============================================================================
// SHARED REQUEST/RESPONSE STRUCTURES
// ============================================================================

/// Standardized response structure for all API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (if successful)
    pub data: Option<T>,
    /// Error message (if failed)
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// JSON error reply with the given status.
pub fn error_reply(status: StatusCode, message: impl Into<String>) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(&ApiResponse::err(message)), status)
}

// ============================================================================
// WARP FILTER HELPERS
// ============================================================================

/// Creates a warp filter that provides access to the immediate checker.
pub fn with_checker(
    checker: Arc<ImmediateChecker>,
) -> impl Filter<Extract = (Arc<ImmediateChecker>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || checker.clone())
}

// ============================================================================
// CUSTOM REJECTION TYPES
// ============================================================================

/// Custom rejection for JSON deserialization errors
#[derive(Debug)]
pub struct JsonDeserializeError(pub String);

impl warp::reject::Reject for JsonDeserializeError {}

// ============================================================================
// REJECTION HANDLER
// ============================================================================

/// Global rejection handler for all API routes.
///
/// Converts warp rejections into `ApiResponse` errors with matching HTTP status codes.
pub async fn handle_rejection(rej: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (status, message) = if let Some(err) = rej.find::<JsonDeserializeError>() {
        (StatusCode::BAD_REQUEST, err.0.clone())
    } else if let Some(err) = rej.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", err))
    } else if rej.is_not_found() {
        (StatusCode::NOT_FOUND, "Endpoint not found".to_string())
    } else if rej.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!("Unhandled rejection: {:?}", rej);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(error_reply(status, message))
}

// ============================================================================
// API SERVER IMPLEMENTATION
// ============================================================================

/// REST API server for the transfer verifier service.
///
/// Lets the front end submit transactions for an immediate check and look
/// up pending records.
pub struct ApiServer {
    /// Service configuration
    config: Arc<Config>,
    /// Immediate checker shared with request handlers
    checker: Arc<ImmediateChecker>,
}

impl ApiServer {
    /// Creates a new API server.
    ///
    /// # Arguments
    ///
    /// * `config` - Service configuration
    /// * `checker` - Immediate checker used by `POST /check`
    pub fn new(config: Config, checker: ImmediateChecker) -> Self {
        Self {
            config: Arc::new(config),
            checker: Arc::new(checker),
        }
    }

    /// Starts the API server and serves requests until `shutdown` resolves.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Server stopped gracefully
    /// * `Err(anyhow::Error)` - Invalid bind address
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let host: IpAddr = self
            .config
            .api
            .host
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid api.host '{}': {}", self.config.api.host, e))?;
        let addr = SocketAddr::new(host, self.config.api.port);

        let routes = self.create_routes();
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| anyhow::anyhow!("Failed to bind API server to {}: {}", addr, e))?;
        info!("API server listening on {}", bound);
        server.await;
        Ok(())
    }

    /// Creates all API routes for the server.
    pub(crate) fn create_routes(
        &self,
    ) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
        use super::check;

        let checker = self.checker.clone();

        // Health check endpoint - returns service status
        let health = warp::path("health").and(warp::path::end()).and(warp::get()).map(|| {
            warp::reply::json(&ApiResponse::ok("Transfer Verifier Service is running".to_string()))
        });

        // POST /check - immediate check of a submitted transaction
        let check_checker = checker.clone();
        let submit = warp::path("check")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::bytes())
            .and_then(move |body: Bytes| {
                let checker = check_checker.clone();
                async move {
                    let body_str = String::from_utf8_lossy(&body);
                    debug!("POST /check - Received body: {}", body_str);

                    match serde_json::from_slice::<check::CheckBody>(&body) {
                        Ok(request) => check::submit_check_handler(request, checker).await,
                        Err(e) => {
                            error!("Check request deserialization failed: {}. Body: {}", e, body_str);
                            Err(warp::reject::custom(JsonDeserializeError(format!("Invalid JSON: {}", e))))
                        }
                    }
                }
            });

        // GET /pending/:chain/:tx_hash - stored record lookup
        let pending = warp::path("pending")
            .and(warp::path::param::<String>())
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::get())
            .and(with_checker(checker))
            .and_then(check::get_pending_handler);

        health.or(submit).or(pending).recover(handle_rejection)
    }

    /// Public method for testing - exposes routes for integration tests
    #[allow(dead_code)] // Used by tests
    pub fn test_routes(&self) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
        self.create_routes()
    }
}
