use crate::auth::AuthGuard;
use crate::database::Database;
use crate::errors::ApiError;
use crate::metrics::{metrics_handler, AUTHORIZATION_DENIALS_TOTAL, PATIENT_RECORDS_SAVED};
use crate::models::*;
use actix_web::{http::header, web, HttpMessage, HttpRequest, HttpResponse, Responder};
use chrono::Utc;

const SAVE_ROLES: &[Role] = &[Role::Admin, Role::Clinician];
const READ_ROLES: &[Role] = &[Role::Admin, Role::Clinician, Role::Viewer];
const AUDIT_ROLES: &[Role] = &[Role::Admin];

pub struct AppState {
    pub db: Database,
    pub auth: AuthGuard,
}

/// Register every route on `cfg`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/save", web::post().to(save_patient))
        .route("/records", web::get().to(list_records))
        .route("/audit", web::get().to(list_audit));
}

/// Run the auth guard for `req` and remember the identity for the access log.
async fn authenticate(req: &HttpRequest, state: &AppState) -> Result<Identity, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let identity = state.auth.authenticate(auth_header, req.path()).await?;
    req.extensions_mut().insert(identity.clone());
    Ok(identity)
}

fn authorize(identity: &Identity, req: &HttpRequest, allowed: &[Role], reason: &str) -> Result<(), ApiError> {
    identity.require_role(allowed, reason).map_err(|e| {
        AUTHORIZATION_DENIALS_TOTAL.with_label_values(&[req.path()]).inc();
        tracing::warn!(
            username = %identity.username,
            role = %identity.role,
            path = %req.path(),
            "Role not allowed"
        );
        e
    })
}

// ============ Health Check ============

pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    match state.db.ping().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "database": "connected",
            "timestamp": Utc::now().to_rfc3339()
        })),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "database": "disconnected"
            }))
        }
    }
}

// ============ Patient Records ============

pub async fn save_patient(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let identity = authenticate(&req, &state).await?;

    let patient: NewPatient = serde_json::from_slice(&body)
        .map_err(|e| ApiError::UnprocessableEntity(e.to_string()))?;

    authorize(&identity, &req, SAVE_ROLES, "Insufficient permissions")?;

    let id = state.db.insert_patient(&patient).await?;
    PATIENT_RECORDS_SAVED.inc();
    tracing::info!(patient_id = id, username = %identity.username, "Patient record saved");

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: format!("Record saved successfully by {}", identity.username),
    }))
}

pub async fn list_records(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let identity = authenticate(&req, &state).await?;
    authorize(&identity, &req, READ_ROLES, "Insufficient permissions")?;

    let patients = state.db.list_patients().await?;
    Ok(HttpResponse::Ok().json(patients))
}

// ============ Audit Trail ============

pub async fn list_audit(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let identity = authenticate(&req, &state).await?;
    authorize(&identity, &req, AUDIT_ROLES, "Only administrators can view the audit log")?;

    let entries = state.db.list_audit_entries().await?;
    Ok(HttpResponse::Ok().json(entries))
}
