mod common;

use actix_web::{
    http::{StatusCode, header},
    test,
};
use common::{access_token, mfa_challenge_token, peer, refresh_token, test_app, test_config};
use serde_json::{Value, json};
use teamhub::model::role::Role;

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

#[actix_web::test]
async fn protected_route_without_token_is_unauthorized() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::get().uri("/api/users").peer_addr(peer()).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Missing Authorization header");
}

#[actix_web::test]
async fn malformed_authorization_header_is_unauthorized() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::get()
        .uri("/api/projects")
        .insert_header((header::AUTHORIZATION, "Token abc"))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn token_signed_with_another_secret_is_rejected() {
    let app = test::init_service(test_app(test_config())).await;

    let mut other = test_config();
    other.jwt_secret = "a-completely-different-secret-value!!".to_string();
    let forged = teamhub::auth::jwt::generate_access_token(
        &teamhub::auth::jwt::TokenSubject {
            user_id: 1,
            email: "admin@teamhub.io".to_string(),
            role: Role::Admin,
            department_id: None,
        },
        &other.jwt_secret,
        900,
    )
    .unwrap();

    let req = test::TestRequest::get()
        .uri("/api/audit-logs")
        .insert_header(bearer(&forged))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn refresh_token_cannot_call_protected_routes() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::get()
        .uri("/api/dashboard")
        .insert_header(bearer(&refresh_token(7, Role::Employee)))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Access token required");
}

#[actix_web::test]
async fn mfa_challenge_token_cannot_read_profile() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .insert_header(bearer(&mfa_challenge_token(7, Role::Employee)))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn employee_is_forbidden_from_staff_routes() {
    let app = test::init_service(test_app(test_config())).await;
    let token = access_token(7, Role::Employee);

    for uri in ["/api/users", "/api/audit-logs", "/api/errors", "/api/dashboard/admin", "/api/dashboard/rrhh"] {
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(bearer(&token))
            .peer_addr(peer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
    }
}

#[actix_web::test]
async fn manager_cannot_open_the_hr_dashboard() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::get()
        .uri("/api/dashboard/rrhh")
        .insert_header(bearer(&access_token(3, Role::Manager)))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn login_validation_lists_the_failing_fields() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "email": "not-an-email", "password": "" }))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Validation failed");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["email", "password"]);
}

#[actix_web::test]
async fn anonymous_error_report_is_validated() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::post()
        .uri("/api/errors")
        .set_json(json!({ "message": "   " }))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fields"][0]["field"], "message");
}

#[actix_web::test]
async fn listing_errors_still_requires_a_token() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::get().uri("/api/errors").peer_addr(peer()).to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn time_entry_with_out_of_range_hours_is_rejected_before_lookup() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::post()
        .uri("/api/time-entries")
        .insert_header(bearer(&access_token(7, Role::Employee)))
        .set_json(json!({ "project_id": 1, "date": "2020-01-06", "hours": 30.0 }))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fields"][0]["field"], "hours");
}

#[actix_web::test]
async fn login_body_missing_fields_gets_the_validation_shape() {
    let app = test::init_service(test_app(test_config())).await;

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({}))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap(),
        "application/json"
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["fields"][0]["field"], "email");
    assert_eq!(body["fields"][0]["message"], "Field is required");
}

#[actix_web::test]
async fn mistyped_query_and_path_values_get_the_validation_shape() {
    let app = test::init_service(test_app(test_config())).await;
    let token = access_token(1, Role::Admin);

    let req = test::TestRequest::get()
        .uri("/api/users?page=first")
        .insert_header(bearer(&token))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["fields"][0]["field"], "query");

    let req = test::TestRequest::get()
        .uri("/api/users/abc")
        .insert_header(bearer(&token))
        .peer_addr(peer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fields"][0]["field"], "path");
}
