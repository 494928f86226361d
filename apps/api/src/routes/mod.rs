pub mod health;

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;

use crate::channel::session::ws_handler;
use crate::errors::handle_middleware_error;
use crate::leads::handlers as leads;
use crate::state::AppState;
use crate::tenants::handlers as tenants;

pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.io_timeout;
    let router = Router::new()
        .route("/health", get(health::health_handler))
        // Leads
        .route(
            "/leads",
            post(leads::handle_submit_leads).get(leads::handle_list_leads),
        )
        .route("/leads/:id", delete(leads::handle_delete_lead))
        .route("/leads/:id/status", put(leads::handle_update_status))
        .route("/leads/:id/date", put(leads::handle_update_date))
        // Tenants and monitored domains
        .route("/user/login", post(tenants::handle_login))
        .route("/user/logout", post(tenants::handle_logout))
        .route("/user/domains", post(tenants::handle_add_domain))
        .route("/user/domains/test", post(tenants::handle_test_domain))
        .route("/user/domains/:email", get(tenants::handle_list_domains))
        .route(
            "/user/domains/:email/count",
            get(tenants::handle_count_domains),
        )
        .route(
            "/user/domains/:email/:domain",
            put(tenants::handle_rename_domain).delete(tenants::handle_remove_domain),
        )
        .with_state(state);
    with_request_timeout(router, timeout)
}

/// Bounds every request; an expired request answers 408 with the error
/// envelope.
fn with_request_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .timeout(timeout),
    )
}

/// Router for the push-channel port. Clients upgrade on `/`.
pub fn build_channel_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::store::memory::MemoryStore;

    fn app() -> Router {
        let store = MemoryStore::new();
        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(store),
            Config::default(),
        );
        build_router(state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn batch(snippets: &[&str]) -> Value {
        json!({
            "emails": snippets
                .iter()
                .map(|s| json!({ "subject": "New lead", "snippet": s }))
                .collect::<Vec<_>>()
        })
    }

    const SNIPPET: &str =
        "name: Priya Shah, category: Wedding, date: 05/06/23, phone: 555-0101, email: Priya@Mail.com";

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["openSessions"], 0);
    }

    #[tokio::test]
    async fn test_submit_then_list_leads() {
        let app = app();
        let (status, body) = call(&app, "POST", "/leads", Some(batch(&[SNIPPET]))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["count"], 1);
        assert_eq!(body["success"], true);

        let (status, body) = call(&app, "GET", "/leads", None).await;
        assert_eq!(status, StatusCode::OK);
        let leads = body["leads"].as_array().unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0]["name"], "Priya Shah");
        assert_eq!(leads[0]["date"], "2023-06-05");
        assert_eq!(leads[0]["status"], "New");
        assert_eq!(leads[0]["email"], "priya@mail.com");
        assert!(leads[0]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_submit_without_emails_is_rejected() {
        let app = app();
        let (status, body) = call(&app, "POST", "/leads", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_same_snippet_across_batches_is_stored_once() {
        let app = app();
        let (_, first) = call(&app, "POST", "/leads", Some(batch(&[SNIPPET]))).await;
        let (status, second) = call(&app, "POST", "/leads", Some(batch(&[SNIPPET]))).await;
        assert_eq!(first["count"], 1);
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(second["count"], 0);

        let (_, body) = call(&app, "GET", "/leads", None).await;
        assert_eq!(body["leads"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_limit() {
        let app = app();
        let snippets = [
            "name: A, category: C, date: 1/1/23",
            "name: B, category: C, date: 1/1/23",
            "name: D, category: C, date: 1/1/23",
        ];
        call(&app, "POST", "/leads", Some(batch(&snippets))).await;
        let (_, body) = call(&app, "GET", "/leads?limit=2", None).await;
        assert_eq!(body["leads"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_status_and_date() {
        let app = app();
        call(&app, "POST", "/leads", Some(batch(&[SNIPPET]))).await;
        let (_, body) = call(&app, "GET", "/leads", None).await;
        let id = body["leads"][0]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/leads/{id}/status"),
            Some(json!({ "status": "Converted" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lead"]["status"], "Converted");

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/leads/{id}/date"),
            Some(json!({ "date": "2024-01-15T09:00:00Z" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lead"]["date"], "2024-01-15");
    }

    #[tokio::test]
    async fn test_invalid_status_leaves_lead_unchanged() {
        let app = app();
        call(&app, "POST", "/leads", Some(batch(&[SNIPPET]))).await;
        let (_, body) = call(&app, "GET", "/leads", None).await;
        let id = body["leads"][0]["id"].as_str().unwrap().to_string();

        for status in ["converted", "Pending"] {
            let (code, _) = call(
                &app,
                "PUT",
                &format!("/leads/{id}/status"),
                Some(json!({ "status": status })),
            )
            .await;
            assert_eq!(code, StatusCode::BAD_REQUEST);
        }

        let (_, body) = call(&app, "GET", "/leads", None).await;
        assert_eq!(body["leads"][0]["status"], "New");
    }

    #[tokio::test]
    async fn test_unknown_lead_is_404() {
        let app = app();
        let id = uuid::Uuid::new_v4();
        let (status, _) = call(
            &app,
            "PUT",
            &format!("/leads/{id}/status"),
            Some(json!({ "status": "Dropped" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "DELETE", &format!("/leads/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_lead() {
        let app = app();
        call(&app, "POST", "/leads", Some(batch(&[SNIPPET]))).await;
        let (_, body) = call(&app, "GET", "/leads", None).await;
        let id = body["leads"][0]["id"].as_str().unwrap().to_string();

        let (status, _) = call(&app, "DELETE", &format!("/leads/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, "GET", "/leads", None).await;
        assert!(body["leads"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_domain_lifecycle() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/user/domains",
            Some(json!({ "email": "Owner@Shop.com", "domain": "shop.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["domains"], json!(["shop.com"]));

        call(
            &app,
            "POST",
            "/user/domains",
            Some(json!({ "email": "owner@shop.com", "domain": "store.io" })),
        )
        .await;
        let (_, body) = call(&app, "GET", "/user/domains/owner@shop.com/count", None).await;
        assert_eq!(body["count"], 2);

        let (status, _) = call(
            &app,
            "PUT",
            "/user/domains/owner@shop.com/shop.com",
            Some(json!({ "newDomain": "store.io" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "PUT",
            "/user/domains/owner@shop.com/shop.com",
            Some(json!({ "newDomain": "shop.net" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let mut domains: Vec<String> = serde_json::from_value(body["domains"].clone()).unwrap();
        domains.sort();
        assert_eq!(domains, vec!["shop.net", "store.io"]);

        let (status, body) =
            call(&app, "DELETE", "/user/domains/owner@shop.com/store.io", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["domains"], json!(["shop.net"]));

        let (_, body) = call(&app, "GET", "/user/domains/owner@shop.com", None).await;
        assert_eq!(body["domains"], json!(["shop.net"]));
    }

    #[tokio::test]
    async fn test_domain_not_found_cases() {
        let app = app();
        let (status, body) = call(&app, "GET", "/user/domains/nobody@x.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["domains"], json!([]));

        let (status, _) = call(&app, "DELETE", "/user/domains/nobody@x.com/x.com", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        call(
            &app,
            "POST",
            "/user/domains",
            Some(json!({ "email": "a@x.com", "domain": "x.com" })),
        )
        .await;
        let (status, _) = call(
            &app,
            "PUT",
            "/user/domains/a@x.com/missing.com",
            Some(json!({ "newDomain": "y.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            "POST",
            "/user/domains",
            Some(json!({ "email": "a@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_domain_format_check() {
        let app = app();
        let (_, body) = call(
            &app,
            "POST",
            "/user/domains/test",
            Some(json!({ "domain": "example.com" })),
        )
        .await;
        assert_eq!(body["isValid"], true);

        let (_, body) = call(
            &app,
            "POST",
            "/user/domains/test",
            Some(json!({ "domain": "not a domain" })),
        )
        .await;
        assert_eq!(body["isValid"], false);
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/user/login",
            Some(json!({ "email": "Me@X.com", "name": "Me" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "me@x.com");
        assert_eq!(body["user"]["isLoggedIn"], true);

        let (status, _) = call(
            &app,
            "POST",
            "/user/logout",
            Some(json!({ "email": "me@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            "POST",
            "/user/logout",
            Some(json!({ "email": "ghost@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_requests_get_error_envelope() {
        let app = app();
        let id = uuid::Uuid::new_v4();
        let cases = [
            ("PUT", format!("/leads/{id}/status"), Some(json!({ "status": 5 }))),
            ("POST", "/leads".to_string(), Some(json!({ "emails": "nope" }))),
            (
                "PUT",
                "/leads/not-a-uuid/status".to_string(),
                Some(json!({ "status": "New" })),
            ),
            ("DELETE", "/leads/123".to_string(), None),
            ("GET", "/leads?limit=lots".to_string(), None),
            (
                "PUT",
                "/user/domains/a@x.com/x.com".to_string(),
                Some(json!({ "newDomain": ["y.com"] })),
            ),
        ];
        for (method, uri, body) in cases {
            let (status, body) = call(&app, method, &uri, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
            assert_eq!(body["success"], false, "{method} {uri}");
            assert_eq!(body["code"], "VALIDATION_ERROR", "{method} {uri}");
            assert!(body["message"].is_string(), "{method} {uri}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_times_out_with_envelope() {
        let slow = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "done"
            }),
        );
        let app = with_request_timeout(slow, Duration::from_secs(1));

        let (status, body) = call(&app, "GET", "/slow", None).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "TIMEOUT");
    }
}
