//! Report Route

use axum::{extract::State, Json};
use chrono::Utc;
use obd_session::{Session, SessionError, REPORT_SENSORS, VEHICLE_INFO};
use report::{assemble, DiagnosticReport, ReportInputs, SystemPrefixDescriber};

use crate::{ApiError, AppState, SharedState};

/// Assemble a report from fresh adapter reads and the last run's aggregates
pub async fn generate(State(state): State<SharedState>) -> Result<Json<DiagnosticReport>, ApiError> {
    let state = state.read().await;
    let _claim = state.claim_adapter().await?;

    let mut session = state.connect().await?;
    let collected = collect(&state, &mut session).await;
    session.close().await;
    let mut inputs = collected?;

    inputs.aggregates = state.run.aggregator.snapshot();
    Ok(Json(assemble(inputs, &SystemPrefixDescriber)))
}

async fn collect(state: &AppState, session: &mut Session) -> Result<ReportInputs, SessionError> {
    let info = state.catalog.select_known(&VEHICLE_INFO);
    let sensors = state.catalog.select_known(&REPORT_SENSORS);

    Ok(ReportInputs {
        generated_at: Utc::now(),
        vehicle_info: session.vehicle_info(&info).await?,
        fault_codes: session.query_fault_codes().await?,
        final_readings: session.read_current(&sensors).await?,
        aggregates: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use crate::create_router;
    use crate::testing::{body_json, state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use storage::LogFormat;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_report_collects_everything() {
        let dir = TempDir::new().unwrap();
        let app = create_router(state(&dir, LogFormat::Csv));
        let response = app
            .oneshot(Request::get("/api/v1/report").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["vehicle_info"]["VIN"], "1HGCM82633A004352");
        assert_eq!(json["vehicle_info"]["Battery Voltage"], "12.6");
        // Unanswered info is left out
        assert!(json["vehicle_info"].get("Fuel Type").is_none());
        assert_eq!(json["fault_codes"][0]["code"], "P0301");
        assert_eq!(json["final_readings"]["RPM"], 800.0);
        assert_eq!(json["final_readings"]["MAF"], Value::Null);
        assert_eq!(json["aggregates"], serde_json::json!({}));
    }
}
