use crate::model::payroll::{EmployeeSalary, PayrollPeriod, PayrollQuery, PayrollStatus, ProcessPayroll};
use crate::service::PayrollService;
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct BulkPayrollRequest {
    #[schema(example = 10)]
    pub company_id: u64,
    #[schema(example = 1)]
    pub month: u32,
    #[schema(example = 2026)]
    pub year: i32,
    pub employees: Vec<EmployeeSalary>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePayrollStatus {
    #[schema(example = "processed", value_type = String)]
    pub status: PayrollStatus,
}

#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = ProcessPayroll,
    responses(
        (status = 201, description = "Draft payroll created", body = Payroll),
        (status = 400, body = ErrorResponse)
    ),
    tag = "Payroll"
)]
pub async fn process_payroll(
    svc: web::Data<PayrollService>,
    payload: web::Json<ProcessPayroll>,
) -> actix_web::Result<impl Responder> {
    let payroll = svc.process_payroll(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(payroll))
}

#[utoipa::path(
    post,
    path = "/api/payroll/bulk",
    request_body = BulkPayrollRequest,
    responses(
        (status = 201, description = "Draft payrolls created", body = [Payroll]),
        (status = 400, body = ErrorResponse)
    ),
    tag = "Payroll"
)]
pub async fn bulk_process_payroll(
    svc: web::Data<PayrollService>,
    payload: web::Json<BulkPayrollRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let period = PayrollPeriod {
        month: payload.month,
        year: payload.year,
    };
    let rows = svc
        .bulk_process_payroll(payload.company_id, period, payload.employees)
        .await?;
    Ok(HttpResponse::Created().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PayrollQuery),
    responses((status = 200, body = PayrollPage)),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    svc: web::Data<PayrollService>,
    query: web::Query<PayrollQuery>,
) -> actix_web::Result<impl Responder> {
    let page = svc
        .get_payrolls(query.company_id, query.status, query.page, query.page_size)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/payroll/{payroll_id}",
    params(("payroll_id", Path, description = "Payroll ID")),
    responses(
        (status = 200, body = Payroll),
        (status = 404, body = ErrorResponse)
    ),
    tag = "Payroll"
)]
pub async fn get_payroll(
    svc: web::Data<PayrollService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let payroll = svc.get_payroll_by_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(payroll))
}

#[utoipa::path(
    get,
    path = "/api/payroll/user/{user_id}",
    params(("user_id", Path, description = "User ID")),
    responses((status = 200, body = [Payroll])),
    tag = "Payroll"
)]
pub async fn user_payrolls(
    svc: web::Data<PayrollService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let rows = svc.get_user_payrolls(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    put,
    path = "/api/payroll/{payroll_id}/status",
    params(("payroll_id", Path, description = "Payroll ID")),
    request_body = UpdatePayrollStatus,
    responses(
        (status = 200, body = Payroll),
        (status = 404, body = ErrorResponse)
    ),
    tag = "Payroll"
)]
pub async fn update_payroll_status(
    svc: web::Data<PayrollService>,
    path: web::Path<u64>,
    body: web::Json<UpdatePayrollStatus>,
) -> actix_web::Result<impl Responder> {
    let payroll = svc
        .update_payroll_status(path.into_inner(), body.status)
        .await?;
    Ok(HttpResponse::Ok().json(payroll))
}

#[utoipa::path(
    post,
    path = "/api/payroll/{payroll_id}/calculate",
    params(("payroll_id", Path, description = "Payroll ID")),
    responses(
        (status = 200, description = "Figures recomputed by the database", body = Payroll),
        (status = 404, body = ErrorResponse)
    ),
    tag = "Payroll"
)]
pub async fn calculate_payroll(
    svc: web::Data<PayrollService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let payroll = svc.calculate_payroll(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(payroll))
}
