use crate::model::attendance::{AttendanceFilter, AttendanceReport, AttendanceSession, BulkAttendanceItem};
use crate::presenter::session_panel::{SessionPanel, TICK, clock_events};
use crate::service::AttendanceService;
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct SignInRequest {
    #[schema(example = 1001)]
    pub user_id: u64,
    /// Resolved from the user's profile when absent
    #[schema(example = 10)]
    pub company_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct SignOutRequest {
    #[schema(example = 10)]
    pub company_id: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct MarkAbsentRequest {
    #[schema(example = 1001)]
    pub user_id: u64,
    #[schema(example = "2026-01-05", value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
    pub company_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct BulkAttendanceRequest {
    /// Resolved from the first item's user when absent
    pub company_id: Option<u64>,
    pub items: Vec<BulkAttendanceItem>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct DateRangeQuery {
    #[schema(example = "2026-01-01", value_type = Option<String>, format = "date")]
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[schema(example = "2026-01-31", value_type = Option<String>, format = "date")]
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct CompanyQuery {
    #[schema(example = 10)]
    pub company_id: u64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    #[schema(example = 10)]
    pub company_id: u64,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    #[param(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(example = "2026-01-31", value_type = String, format = "date")]
    #[param(value_type = String, format = "date")]
    pub to: NaiveDate,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PanelQuery {
    pub company_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct PanelSignOutRequest {
    pub session_id: u64,
    pub company_id: u64,
}

/// Sign-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 201, description = "Signed in", body = AttendanceSession),
        (status = 400, description = "Missing user or company", body = ErrorResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse),
        (status = 409, description = "Already signed in today", body = ErrorResponse, example = json!({
            "code": "already_signed_in",
            "message": "Already signed in today"
        })),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "Attendance"
)]
pub async fn sign_in(
    svc: web::Data<AttendanceService>,
    payload: web::Json<SignInRequest>,
) -> actix_web::Result<impl Responder> {
    let session = svc.sign_in(payload.user_id, payload.company_id).await?;
    Ok(HttpResponse::Created().json(session))
}

/// Sign-out endpoint
#[utoipa::path(
    put,
    path = "/api/attendance/{session_id}/sign-out",
    params(("session_id", Path, description = "Attendance session ID")),
    request_body = SignOutRequest,
    responses(
        (status = 200, description = "Signed out", body = AttendanceSession),
        (status = 404, description = "No such session in this company", body = ErrorResponse),
        (status = 409, description = "Session already signed out", body = ErrorResponse)
    ),
    tag = "Attendance"
)]
pub async fn sign_out(
    svc: web::Data<AttendanceService>,
    path: web::Path<u64>,
    payload: web::Json<SignOutRequest>,
) -> actix_web::Result<impl Responder> {
    let session = svc.sign_out(path.into_inner(), payload.company_id).await?;
    Ok(HttpResponse::Ok().json(session))
}

#[utoipa::path(
    post,
    path = "/api/attendance/absent",
    request_body = MarkAbsentRequest,
    responses(
        (status = 201, description = "Absence recorded", body = AttendanceSession),
        (status = 400, body = ErrorResponse)
    ),
    tag = "Attendance"
)]
pub async fn mark_absent(
    svc: web::Data<AttendanceService>,
    payload: web::Json<MarkAbsentRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let session = svc
        .mark_absent(payload.user_id, payload.date, payload.company_id)
        .await?;
    Ok(HttpResponse::Created().json(session))
}

#[utoipa::path(
    post,
    path = "/api/attendance/bulk",
    request_body = BulkAttendanceRequest,
    responses(
        (status = 201, description = "Rows inserted", body = [AttendanceSession]),
        (status = 400, body = ErrorResponse)
    ),
    tag = "Attendance"
)]
pub async fn bulk_mark(
    svc: web::Data<AttendanceService>,
    payload: web::Json<BulkAttendanceRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let rows = svc.bulk_mark_attendance(payload.items, payload.company_id).await?;
    Ok(HttpResponse::Created().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceFilter),
    responses((status = 200, description = "Sessions, newest first", body = [AttendanceSession])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    svc: web::Data<AttendanceService>,
    query: web::Query<AttendanceFilter>,
) -> actix_web::Result<impl Responder> {
    let rows = svc.get_attendance(&query).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/attendance/{session_id}",
    params(("session_id", Path, description = "Attendance session ID")),
    responses(
        (status = 200, body = AttendanceSession),
        (status = 404, body = ErrorResponse)
    ),
    tag = "Attendance"
)]
pub async fn get_attendance(
    svc: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let session = svc.get_attendance_by_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(session))
}

#[utoipa::path(
    get,
    path = "/api/attendance/user/{user_id}",
    params(("user_id", Path, description = "User ID"), DateRangeQuery),
    responses((status = 200, body = [AttendanceSession])),
    tag = "Attendance"
)]
pub async fn user_attendance(
    svc: web::Data<AttendanceService>,
    path: web::Path<u64>,
    query: web::Query<DateRangeQuery>,
) -> actix_web::Result<impl Responder> {
    let rows = svc
        .get_user_attendance(path.into_inner(), query.from, query.to)
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/attendance/today",
    params(CompanyQuery),
    responses((status = 200, body = [AttendanceSession])),
    tag = "Attendance"
)]
pub async fn today_attendance(
    svc: web::Data<AttendanceService>,
    query: web::Query<CompanyQuery>,
) -> actix_web::Result<impl Responder> {
    let rows = svc.get_today_attendance(query.company_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(ReportQuery),
    responses(
        (status = 200, body = AttendanceReport),
        (status = 400, body = ErrorResponse)
    ),
    tag = "Attendance"
)]
pub async fn attendance_report(
    svc: web::Data<AttendanceService>,
    query: web::Query<ReportQuery>,
) -> actix_web::Result<impl Responder> {
    let report = svc
        .get_attendance_report(query.company_id, query.from, query.to)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Clock and active session for the session panel
#[utoipa::path(
    get,
    path = "/api/attendance/panel/{user_id}",
    params(("user_id", Path, description = "User ID"), PanelQuery),
    responses((status = 200, body = PanelView)),
    tag = "Session panel"
)]
pub async fn panel_view(
    svc: web::Data<AttendanceService>,
    path: web::Path<u64>,
    query: web::Query<PanelQuery>,
) -> actix_web::Result<impl Responder> {
    let view = SessionPanel::new(&svc).view(path.into_inner(), query.company_id).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Wall-clock and elapsed-session ticks as server-sent events
#[utoipa::path(
    get,
    path = "/api/attendance/panel/{user_id}/events",
    params(("user_id", Path, description = "User ID"), PanelQuery),
    responses((status = 200, description = "`clock` and `elapsed` events every second", content_type = "text/event-stream", body = String)),
    tag = "Session panel"
)]
pub async fn panel_events(
    svc: web::Data<AttendanceService>,
    path: web::Path<u64>,
    query: web::Query<PanelQuery>,
) -> actix_web::Result<HttpResponse> {
    let session = SessionPanel::new(&svc)
        .active_session(path.into_inner(), query.company_id)
        .await?;
    let body = clock_events(session, TICK)
        .map(|event| Ok::<_, Infallible>(web::Bytes::from(event.to_sse())));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(body))
}

#[utoipa::path(
    post,
    path = "/api/attendance/panel/{user_id}/sign-in",
    params(("user_id", Path, description = "User ID"), PanelQuery),
    responses((status = 200, description = "Notification for the action", body = PanelOutcome)),
    tag = "Session panel"
)]
pub async fn panel_sign_in(
    svc: web::Data<AttendanceService>,
    path: web::Path<u64>,
    query: web::Query<PanelQuery>,
) -> impl Responder {
    let outcome = SessionPanel::new(&svc).sign_in(path.into_inner(), query.company_id).await;
    HttpResponse::Ok().json(outcome)
}

#[utoipa::path(
    post,
    path = "/api/attendance/panel/sign-out",
    request_body = PanelSignOutRequest,
    responses((status = 200, description = "Notification for the action", body = PanelOutcome)),
    tag = "Session panel"
)]
pub async fn panel_sign_out(
    svc: web::Data<AttendanceService>,
    payload: web::Json<PanelSignOutRequest>,
) -> impl Responder {
    let outcome = SessionPanel::new(&svc)
        .sign_out(payload.session_id, payload.company_id)
        .await;
    HttpResponse::Ok().json(outcome)
}
