use crate::{
    api::{attendance, payroll},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;

// Helper to build the API limiter
fn build_limiter(requests_per_min: u32) -> Option<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        60_000 / requests_per_min as u64
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms.max(1))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()?;
    Some(Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let scope = web::scope(&config.api_prefix);
    match build_limiter(config.rate_per_min) {
        Some(limiter) => cfg.service(scope.wrap(limiter).configure(api_routes)),
        None => {
            tracing::warn!(rate_per_min = config.rate_per_min, "Rate limiter disabled: invalid quota");
            cfg.service(scope.configure(api_routes))
        }
    };
}

/// Routes under the API prefix. Literal segments are registered before
/// `{id}` resources so they are matched first.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/attendance")
            // /attendance
            .service(web::resource("").route(web::get().to(attendance::list_attendance)))
            .service(web::resource("/sign-in").route(web::post().to(attendance::sign_in)))
            .service(web::resource("/absent").route(web::post().to(attendance::mark_absent)))
            .service(web::resource("/bulk").route(web::post().to(attendance::bulk_mark)))
            .service(web::resource("/today").route(web::get().to(attendance::today_attendance)))
            .service(web::resource("/report").route(web::get().to(attendance::attendance_report)))
            .service(
                web::resource("/user/{user_id}").route(web::get().to(attendance::user_attendance)),
            )
            // /attendance/panel/...
            .service(
                web::resource("/panel/sign-out").route(web::post().to(attendance::panel_sign_out)),
            )
            .service(web::resource("/panel/{user_id}").route(web::get().to(attendance::panel_view)))
            .service(
                web::resource("/panel/{user_id}/events")
                    .route(web::get().to(attendance::panel_events)),
            )
            .service(
                web::resource("/panel/{user_id}/sign-in")
                    .route(web::post().to(attendance::panel_sign_in)),
            )
            // /attendance/{id}
            .service(web::resource("/{id}").route(web::get().to(attendance::get_attendance)))
            .service(web::resource("/{id}/sign-out").route(web::put().to(attendance::sign_out))),
    )
    .service(
        web::scope("/payroll")
            // /payroll
            .service(
                web::resource("")
                    .route(web::post().to(payroll::process_payroll))
                    .route(web::get().to(payroll::list_payrolls)),
            )
            .service(web::resource("/bulk").route(web::post().to(payroll::bulk_process_payroll)))
            .service(web::resource("/user/{user_id}").route(web::get().to(payroll::user_payrolls)))
            //payroll/{id}
            .service(web::resource("/{id}").route(web::get().to(payroll::get_payroll)))
            .service(
                web::resource("/{id}/status").route(web::put().to(payroll::update_payroll_status)),
            )
            .service(
                web::resource("/{id}/calculate").route(web::post().to(payroll::calculate_payroll)),
            ),
    );
}
