//! Registry API Endpoints
//!
//! One route per registry command and query. The acting identity is read from
//! the `x-caller-address` header; API-key authentication happens upstream in
//! the middleware stack.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::registry::{
    Address, AuditReport, AuditSubmission, AuditorProfile, Capabilities, CommandOutcome,
    ExecuteError, Finding, JournalEntry, NewFinding, RegistryError, RegistryManager,
    RegistryStats, Role,
};

/// Header carrying the caller's address
pub const CALLER_HEADER: &str = "x-caller-address";

/// API state for registry endpoints
#[derive(Clone)]
pub struct RegistryApiState {
    pub manager: RegistryManager,
    /// Upper bound on `GET /journal?limit=`
    pub journal_page_limit: usize,
}

type ApiError = (StatusCode, String);
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Identity of the acting principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Address);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    format!("missing {} header", CALLER_HEADER),
                )
            })?
            .to_str()
            .map_err(|_| {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("{} header is not valid text", CALLER_HEADER),
                )
            })?;

        Address::parse(raw)
            .map(Caller)
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, format!("invalid caller address: {}", e)))
    }
}

/// HTTP status for a rejected command
pub fn status_for(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::Unauthorized { .. } | RegistryError::NotRegistered(_) => {
            StatusCode::FORBIDDEN
        }
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::AlreadyRegistered(_) | RegistryError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        RegistryError::InvalidScore(_) | RegistryError::InvalidSeverity(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

fn rejected(err: RegistryError) -> ApiError {
    (status_for(&err), err.to_string())
}

fn execute_failed(err: ExecuteError) -> ApiError {
    match err {
        ExecuteError::Rejected(err) => rejected(err),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::parse(raw)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, format!("invalid address {}: {}", raw, e)))
}

// Request types

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: String,
    #[serde(default)]
    pub profile_url: String,
}

#[derive(Debug, Deserialize)]
pub struct JournalQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CapabilitiesQuery {
    pub report_id: Option<u64>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct AuditorResponse {
    #[serde(flatten)]
    pub profile: AuditorProfile,
    pub report_ids: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    #[serde(flatten)]
    pub report: AuditReport,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Serialize)]
pub struct ReportIdsResponse {
    pub address: Address,
    pub report_ids: Vec<u64>,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct SecurityScoreResponse {
    pub contract_address: Address,
    pub average: u8,
    pub audit_count: u64,
    pub is_audited: bool,
}

#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    pub caller: Address,
    pub report_id: Option<u64>,
    pub capabilities: Capabilities,
    pub roles: Vec<Role>,
}

// Auditor endpoints

/// POST /registry/auditors - Register the caller as an auditor
pub async fn register_auditor(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Json(payload): Json<ProfileRequest>,
) -> Result<(StatusCode, Json<CommandOutcome>), ApiError> {
    let outcome = state
        .manager
        .register_auditor(&caller, payload.name, payload.profile_url)
        .await
        .map_err(execute_failed)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// PUT /registry/auditors - Update the caller's own profile
pub async fn update_auditor_profile(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Json(payload): Json<ProfileRequest>,
) -> ApiResult<CommandOutcome> {
    state
        .manager
        .update_auditor_profile(&caller, payload.name, payload.profile_url)
        .await
        .map(Json)
        .map_err(execute_failed)
}

/// GET /registry/auditors/{address}
pub async fn get_auditor(
    State(state): State<RegistryApiState>,
    Path(address): Path<String>,
) -> ApiResult<AuditorResponse> {
    let address = parse_address(&address)?;
    // An unknown auditor is a missing record on reads
    let profile = state
        .manager
        .auditor(&address)
        .await
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;
    let report_ids = state.manager.get_auditor_report_ids(&address).await;
    Ok(Json(AuditorResponse {
        profile,
        report_ids,
    }))
}

/// GET /registry/auditors/{address}/reports
pub async fn get_auditor_reports(
    State(state): State<RegistryApiState>,
    Path(address): Path<String>,
) -> ApiResult<ReportIdsResponse> {
    let address = parse_address(&address)?;
    let report_ids = state.manager.get_auditor_report_ids(&address).await;
    Ok(Json(ReportIdsResponse {
        count: report_ids.len() as u64,
        address,
        report_ids,
    }))
}

/// POST /registry/auditors/{address}/verify - Administrator only
pub async fn verify_auditor(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
) -> ApiResult<CommandOutcome> {
    let auditor = parse_address(&address)?;
    state
        .manager
        .verify_auditor(&caller, auditor)
        .await
        .map(Json)
        .map_err(execute_failed)
}

/// POST /registry/auditors/{address}/revoke - Administrator only
pub async fn revoke_auditor(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
) -> ApiResult<CommandOutcome> {
    let auditor = parse_address(&address)?;
    state
        .manager
        .revoke_auditor(&caller, auditor)
        .await
        .map(Json)
        .map_err(execute_failed)
}

// Report endpoints

/// POST /registry/audits - Submit an audit report
pub async fn submit_audit(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Json(submission): Json<AuditSubmission>,
) -> Result<(StatusCode, Json<CommandOutcome>), ApiError> {
    let outcome = state
        .manager
        .submit_audit(&caller, submission)
        .await
        .map_err(execute_failed)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /registry/audits/{report_id}
pub async fn get_report(
    State(state): State<RegistryApiState>,
    Path(report_id): Path<u64>,
) -> ApiResult<ReportResponse> {
    let report = state.manager.get_report(report_id).await.map_err(rejected)?;
    let findings = report.findings().to_vec();
    Ok(Json(ReportResponse { report, findings }))
}

/// GET /registry/audits/{report_id}/findings
pub async fn get_findings(
    State(state): State<RegistryApiState>,
    Path(report_id): Path<u64>,
) -> ApiResult<Vec<Finding>> {
    state
        .manager
        .get_findings(report_id)
        .await
        .map(Json)
        .map_err(rejected)
}

/// POST /registry/audits/{report_id}/findings - Report author only
pub async fn add_finding(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Path(report_id): Path<u64>,
    Json(finding): Json<NewFinding>,
) -> Result<(StatusCode, Json<CommandOutcome>), ApiError> {
    let outcome = state
        .manager
        .add_finding(&caller, report_id, finding)
        .await
        .map_err(execute_failed)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /registry/audits/{report_id}/findings/{index}
pub async fn get_finding(
    State(state): State<RegistryApiState>,
    Path((report_id, index)): Path<(u64, u64)>,
) -> ApiResult<Finding> {
    state
        .manager
        .get_finding(report_id, index)
        .await
        .map(Json)
        .map_err(rejected)
}

/// POST /registry/audits/{report_id}/findings/{index}/acknowledge - Project owner only
pub async fn acknowledge_finding(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Path((report_id, index)): Path<(u64, u64)>,
) -> ApiResult<CommandOutcome> {
    state
        .manager
        .acknowledge_finding(&caller, report_id, index)
        .await
        .map(Json)
        .map_err(execute_failed)
}

/// POST /registry/audits/{report_id}/findings/{index}/resolve - Project owner only
pub async fn resolve_finding(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Path((report_id, index)): Path<(u64, u64)>,
) -> ApiResult<CommandOutcome> {
    state
        .manager
        .resolve_finding(&caller, report_id, index)
        .await
        .map(Json)
        .map_err(execute_failed)
}

/// POST /registry/audits/{report_id}/verify - Project owner only
pub async fn verify_audit(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Path(report_id): Path<u64>,
) -> ApiResult<CommandOutcome> {
    state
        .manager
        .verify_audit(&caller, report_id)
        .await
        .map(Json)
        .map_err(execute_failed)
}

/// POST /registry/audits/{report_id}/dispute - Project owner only
pub async fn dispute_audit(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Path(report_id): Path<u64>,
) -> ApiResult<CommandOutcome> {
    state
        .manager
        .dispute_audit(&caller, report_id)
        .await
        .map(Json)
        .map_err(execute_failed)
}

/// POST /registry/audits/{report_id}/resolve - Administrator only
pub async fn resolve_dispute(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Path(report_id): Path<u64>,
) -> ApiResult<CommandOutcome> {
    state
        .manager
        .resolve_dispute(&caller, report_id)
        .await
        .map(Json)
        .map_err(execute_failed)
}

// Contract endpoints

/// GET /registry/contracts/{address}/audits
pub async fn get_contract_audits(
    State(state): State<RegistryApiState>,
    Path(address): Path<String>,
) -> ApiResult<ReportIdsResponse> {
    let address = parse_address(&address)?;
    let report_ids = state.manager.get_contract_audit_ids(&address).await;
    Ok(Json(ReportIdsResponse {
        count: report_ids.len() as u64,
        address,
        report_ids,
    }))
}

/// GET /registry/contracts/{address}/score
pub async fn get_security_score(
    State(state): State<RegistryApiState>,
    Path(address): Path<String>,
) -> ApiResult<SecurityScoreResponse> {
    let contract_address = parse_address(&address)?;
    let score = state.manager.get_security_score(&contract_address).await;
    Ok(Json(SecurityScoreResponse {
        contract_address,
        average: score.average,
        audit_count: score.audit_count,
        is_audited: score.is_audited(),
    }))
}

// Registry-wide endpoints

/// GET /registry/stats
pub async fn get_stats(State(state): State<RegistryApiState>) -> Json<RegistryStats> {
    Json(state.manager.stats().await)
}

/// GET /registry/journal?limit=N - Most recent entries, newest first
pub async fn get_journal(
    State(state): State<RegistryApiState>,
    Query(query): Query<JournalQuery>,
) -> Json<Vec<JournalEntry>> {
    let limit = query
        .limit
        .unwrap_or(state.journal_page_limit)
        .min(state.journal_page_limit);
    Json(state.manager.recent_journal(limit).await)
}

/// GET /registry/capabilities?report_id=N - Roles held by the caller
pub async fn get_capabilities(
    State(state): State<RegistryApiState>,
    Caller(caller): Caller,
    Query(query): Query<CapabilitiesQuery>,
) -> Json<CapabilitiesResponse> {
    let capabilities = state.manager.capabilities(&caller, query.report_id).await;
    Json(CapabilitiesResponse {
        roles: capabilities.roles(),
        caller,
        report_id: query.report_id,
        capabilities,
    })
}

// Router

pub fn create_router(state: RegistryApiState) -> Router {
    Router::new()
        .route("/auditors", post(register_auditor).put(update_auditor_profile))
        .route("/auditors/{address}", get(get_auditor))
        .route("/auditors/{address}/reports", get(get_auditor_reports))
        .route("/auditors/{address}/verify", post(verify_auditor))
        .route("/auditors/{address}/revoke", post(revoke_auditor))
        .route("/audits", post(submit_audit))
        .route("/audits/{report_id}", get(get_report))
        .route("/audits/{report_id}/findings", get(get_findings).post(add_finding))
        .route("/audits/{report_id}/findings/{index}", get(get_finding))
        .route(
            "/audits/{report_id}/findings/{index}/acknowledge",
            post(acknowledge_finding),
        )
        .route(
            "/audits/{report_id}/findings/{index}/resolve",
            post(resolve_finding),
        )
        .route("/audits/{report_id}/verify", post(verify_audit))
        .route("/audits/{report_id}/dispute", post(dispute_audit))
        .route("/audits/{report_id}/resolve", post(resolve_dispute))
        .route("/contracts/{address}/audits", get(get_contract_audits))
        .route("/contracts/{address}/score", get(get_security_score))
        .route("/stats", get(get_stats))
        .route("/journal", get(get_journal))
        .route("/capabilities", get(get_capabilities))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RecordRef;
    use axum::http::Request;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let unauthorized = RegistryError::Unauthorized {
            caller: addr(1),
            action: "resolve disputes",
        };
        assert_eq!(status_for(&unauthorized), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&RegistryError::NotRegistered(addr(1))), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&RegistryError::NotFound(RecordRef::Report(3))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RegistryError::AlreadyRegistered(addr(1))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&RegistryError::InvalidScore(101)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&RegistryError::InvalidSeverity(9)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_persistence_failure_is_server_error() {
        let (status, message) = execute_failed(ExecuteError::Persistence {
            sequence: 4,
            reason: "connection reset".to_string(),
        });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_caller_extractor() {
        let request = Request::builder()
            .header(CALLER_HEADER, "0x00000000000000000000000000000000000000AB")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let Caller(caller) = Caller::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller, addr(0xab));

        let request = Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let err = Caller::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .header(CALLER_HEADER, "0xnothex")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let err = Caller::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_get_auditor_unknown_is_not_found() {
        let state = RegistryApiState {
            manager: RegistryManager::new(addr(1), crate::registry::ScoringPolicy::default(), 16),
            journal_page_limit: 50,
        };
        state
            .manager
            .register_auditor(&addr(2), "Acme".to_string(), String::new())
            .await
            .unwrap();

        let Json(found) = get_auditor(State(state.clone()), Path(addr(2).to_string()))
            .await
            .unwrap();
        assert_eq!(found.profile.name, "Acme");

        let err = get_auditor(State(state), Path(addr(7).to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
