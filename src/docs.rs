use crate::api::attendance::{
    BulkAttendanceRequest, MarkAbsentRequest, PanelSignOutRequest, SignInRequest, SignOutRequest,
};
use crate::api::payroll::{BulkPayrollRequest, UpdatePayrollStatus};
use crate::error::ErrorResponse;
use crate::model::attendance::{
    AttendanceReport, AttendanceSession, AttendanceStatus, BulkAttendanceItem, UserAttendanceSummary,
};
use crate::model::payroll::{
    EmployeeSalary, Payroll, PayrollPage, PayrollPeriod, PayrollStatus, ProcessPayroll,
};
use crate::presenter::session_panel::{
    ClockView, Notification, NotificationKind, PanelOutcome, PanelView,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Core API",
        version = "1.0.0",
        description = r#"
## Attendance and payroll data access

### 🔹 Attendance
- Daily sign-in and sign-out, one open session per user per day
- Absences, bulk marking, per-user history and today's roster
- Per-company attendance reports over a date range

### 🔹 Session panel
- Live wall clock and elapsed session time (server-sent events)
- Sign-in / sign-out actions that answer with a notification

### 🔹 Payroll
- Draft payroll records, singly or in bulk per company and period
- Status transitions and database-side recalculation
- Paginated company listings

### 📦 Errors
Failures come back as `{ "code": "...", "message": "..." }`.
Transient store failures are retried before a `503` is returned.

---
Built with **Rust**, **Actix Web**, **SQLx**, **moka** and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::sign_in,
        crate::api::attendance::sign_out,
        crate::api::attendance::mark_absent,
        crate::api::attendance::bulk_mark,
        crate::api::attendance::list_attendance,
        crate::api::attendance::get_attendance,
        crate::api::attendance::user_attendance,
        crate::api::attendance::today_attendance,
        crate::api::attendance::attendance_report,

        crate::api::attendance::panel_view,
        crate::api::attendance::panel_events,
        crate::api::attendance::panel_sign_in,
        crate::api::attendance::panel_sign_out,

        crate::api::payroll::process_payroll,
        crate::api::payroll::bulk_process_payroll,
        crate::api::payroll::list_payrolls,
        crate::api::payroll::get_payroll,
        crate::api::payroll::user_payrolls,
        crate::api::payroll::update_payroll_status,
        crate::api::payroll::calculate_payroll,

        crate::api::health::health
    ),
    components(
        schemas(
            ErrorResponse,
            AttendanceStatus,
            AttendanceSession,
            BulkAttendanceItem,
            UserAttendanceSummary,
            AttendanceReport,
            SignInRequest,
            SignOutRequest,
            MarkAbsentRequest,
            BulkAttendanceRequest,
            PanelSignOutRequest,
            ClockView,
            NotificationKind,
            Notification,
            PanelOutcome,
            PanelView,
            PayrollStatus,
            Payroll,
            PayrollPage,
            PayrollPeriod,
            ProcessPayroll,
            EmployeeSalary,
            BulkPayrollRequest,
            UpdatePayrollStatus
        )
    ),
    tags(
        (name = "Attendance", description = "Attendance session APIs"),
        (name = "Session panel", description = "Live clock and session actions for a signed-in user"),
        (name = "Payroll", description = "Payroll management APIs"),
        (name = "System", description = "Liveness and store health"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/api/attendance/sign-in",
            "/api/attendance/{session_id}/sign-out",
            "/api/attendance/report",
            "/api/attendance/panel/{user_id}/events",
            "/api/payroll",
            "/api/payroll/{payroll_id}/calculate",
            "/health",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
