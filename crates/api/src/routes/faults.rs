//! Trouble Code Routes

use axum::{extract::State, Json};
use report::{DtcDescriber, FaultCode, SystemPrefixDescriber};
use serde::Serialize;

use crate::{ApiError, SharedState};

/// Stored trouble codes
#[derive(Debug, Serialize)]
pub struct FaultsResponse {
    pub data: Vec<FaultCode>,
    pub count: usize,
}

/// Result of a clear request
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

/// Read stored trouble codes
pub async fn read(State(state): State<SharedState>) -> Result<Json<FaultsResponse>, ApiError> {
    let state = state.read().await;
    let _claim = state.claim_adapter().await?;

    let mut session = state.connect().await?;
    let codes = session.query_fault_codes().await;
    session.close().await;

    let describer = SystemPrefixDescriber;
    let data: Vec<FaultCode> = codes?
        .into_iter()
        .map(|code| FaultCode {
            description: describer.describe(&code),
            code,
        })
        .collect();
    Ok(Json(FaultsResponse {
        count: data.len(),
        data,
    }))
}

/// Clear stored trouble codes
pub async fn clear(State(state): State<SharedState>) -> Result<Json<ClearResponse>, ApiError> {
    let state = state.read().await;
    let _claim = state.claim_adapter().await?;

    let mut session = state.connect().await?;
    let cleared = session.clear_fault_codes().await;
    session.close().await;

    Ok(Json(ClearResponse { cleared: cleared? }))
}
