//! Transaction check endpoints
//!
//! `POST /check` runs the immediate check for a submitted hash and
//! `GET /pending/:chain/:tx_hash` returns a tracked record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};

use super::generic::{error_reply, ApiResponse};
use crate::effects::{Notice, Outcome};
use crate::messages;
use crate::monitor::{CheckRequest, ImmediateChecker, SubmitStatus};
use crate::tx_hash::{normalize, parse_tx_hash};
use crate::validator::{Chain, CheckCode, StageSet, TransferDetails};

// ============================================================================
// REQUEST/RESPONSE STRUCTURES
// ============================================================================

/// Body of `POST /check`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckBody {
    pub chain: Chain,
    /// Transaction hash or explorer link
    pub tx: String,
    pub target_address: String,
    pub requester_id: String,
    #[serde(default)]
    pub conversation_ref: serde_json::Value,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub claimed_amount: Option<String>,
}

/// Data of a `POST /check` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub tx_hash: String,
    /// One of confirmed, rejected, pending, already_tracked, busy
    pub status: String,
    pub code: Option<CheckCode>,
    /// Localized text for the requester
    pub message: String,
    pub remaining: Option<StageSet>,
    pub details: Option<TransferDetails>,
}

impl CheckResponse {
    fn from_status(tx_hash: String, chain: Chain, locale: &str, status: SubmitStatus) -> Self {
        let in_progress = messages::render(&Notice::InProgress, chain, locale);
        match status {
            SubmitStatus::Confirmed { details } => Self {
                tx_hash,
                status: "confirmed".to_string(),
                code: None,
                message: messages::render(
                    &Notice::Final(Outcome::Confirmed { details: details.clone() }),
                    chain,
                    locale,
                ),
                remaining: None,
                details: Some(details),
            },
            SubmitStatus::Rejected { code, error } => Self {
                tx_hash,
                status: "rejected".to_string(),
                code: Some(code),
                message: messages::render(&Notice::Final(Outcome::Rejected { code, error }), chain, locale),
                remaining: None,
                details: None,
            },
            SubmitStatus::Pending {
                code,
                remaining,
                details,
                ..
            } => Self {
                tx_hash,
                status: "pending".to_string(),
                code: Some(code),
                message: in_progress,
                remaining: Some(remaining),
                details: Some(details),
            },
            SubmitStatus::AlreadyTracked { record } => Self {
                tx_hash,
                status: "already_tracked".to_string(),
                code: record.last_error_code,
                message: in_progress,
                remaining: Some(record.outstanding_stages),
                details: Some(record.details),
            },
            SubmitStatus::Busy => Self {
                tx_hash,
                status: "busy".to_string(),
                code: None,
                message: in_progress,
                remaining: None,
                details: None,
            },
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Handler for `POST /check`.
///
/// # Arguments
///
/// * `body` - Submitted transaction
/// * `checker` - Immediate checker
///
/// # Returns
///
/// * `Ok(warp::Reply)` - 200 with the check result, 400 for a bad hash or
///   disabled chain, 500 when the check could not complete
pub async fn submit_check_handler(
    body: CheckBody,
    checker: Arc<ImmediateChecker>,
) -> Result<WithStatus<Json>, warp::Rejection> {
    let tx_hash = match parse_tx_hash(&body.tx, body.chain) {
        Ok(hash) => hash,
        Err(e) => return Ok(error_reply(StatusCode::BAD_REQUEST, e.to_string())),
    };
    if body.target_address.trim().is_empty() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "target_address must not be empty"));
    }
    if !checker.supports(body.chain) {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            format!("chain {} is not enabled", body.chain),
        ));
    }

    let locale = body.locale.unwrap_or_else(|| "en".to_string());
    let request = CheckRequest {
        chain: body.chain,
        tx_hash: tx_hash.clone(),
        target_address: body.target_address.trim().to_string(),
        requester_id: body.requester_id,
        conversation_ref: body.conversation_ref,
        locale: locale.clone(),
        claimed_amount: body.claimed_amount,
    };

    match checker.submit(request).await {
        Ok(status) => {
            let response = CheckResponse::from_status(tx_hash, body.chain, &locale, status);
            Ok(warp::reply::with_status(
                warp::reply::json(&ApiResponse::ok(response)),
                StatusCode::OK,
            ))
        }
        Err(e) => {
            error!("Immediate check of {} failed: {:#}", tx_hash, e);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Check failed: {}", e),
            ))
        }
    }
}

/// Handler for `GET /pending/:chain/:tx_hash`.
pub async fn get_pending_handler(
    chain: String,
    tx_hash: String,
    checker: Arc<ImmediateChecker>,
) -> Result<WithStatus<Json>, warp::Rejection> {
    let chain: Chain = match chain.parse() {
        Ok(chain) => chain,
        Err(e) => return Ok(error_reply(StatusCode::BAD_REQUEST, format!("{}", e))),
    };
    let tx_hash = normalize(&tx_hash);

    match checker.store().get(chain, &tx_hash).await {
        Ok(Some(record)) => Ok(warp::reply::with_status(
            warp::reply::json(&ApiResponse::ok(record)),
            StatusCode::OK,
        )),
        Ok(None) => Ok(error_reply(
            StatusCode::NOT_FOUND,
            format!("No pending record for {} {}", chain, tx_hash),
        )),
        Err(e) => {
            error!("Pending lookup of {} failed: {}", tx_hash, e);
            Ok(error_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
