use crate::store::HrStore;
use actix_web::{HttpResponse, Responder, get, web};
use serde_json::json;
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Store reachable", body = Object, example = json!({
            "status": "ok", "store": "mysql"
        })),
        (status = 503, description = "Store unreachable")
    ),
    tag = "System"
)]
#[get("/health")]
pub async fn health(store: web::Data<Arc<dyn HrStore>>) -> impl Responder {
    match store.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "store": store.backend_name()
        })),
        Err(e) => {
            tracing::error!(error = %e, store = store.backend_name(), "Health check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unavailable",
                "store": store.backend_name()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::Value;

    #[actix_web::test]
    async fn reports_backend_and_status() {
        let store: Arc<dyn HrStore> = Arc::new(InMemoryStore::new());
        let app = test::init_service(App::new().app_data(web::Data::new(store)).service(health)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
    }

    #[actix_web::test]
    async fn unreachable_store_is_503() {
        let memory = InMemoryStore::new();
        memory.fail_next(1);
        let store: Arc<dyn HrStore> = Arc::new(memory);
        let app = test::init_service(App::new().app_data(web::Data::new(store)).service(health)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
