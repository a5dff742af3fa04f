mod common;

use axum::body::Body;
use axum::extract::{Extension, Request};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceExt;

use campus_api::auth::Role;
use campus_api::middleware::{
    resolve_tenant, resolve_tenant_optional, tenant_isolation_guard, TenantContext,
};
use campus_api::state::AppState;

async fn data(tenant: Option<Extension<TenantContext>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "tenant": tenant.map(|Extension(ctx)| ctx.tenant.id),
    }))
}

fn resolver_router(state: AppState, optional: bool) -> Router {
    let router = Router::new().route("/data", get(data));
    if optional {
        router.layer(from_fn_with_state(state, resolve_tenant_optional))
    } else {
        router.layer(from_fn_with_state(state, resolve_tenant))
    }
}

fn guard_router(state: AppState) -> Router {
    Router::new()
        .route("/data", get(data))
        .layer(from_fn_with_state(state, tenant_isolation_guard))
}

fn get_req(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn non_superuser_without_hint_is_rejected() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        resolver_router(state, false),
        common::user(Role::Teacher, None),
    );

    let res = app.oneshot(get_req("/data", &[])).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body = common::body_json(res).await;
    assert_eq!(body["code"], "TENANT_CONTEXT_REQUIRED");
}

#[tokio::test]
async fn superuser_without_hint_proceeds_without_tenant() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        resolver_router(state, false),
        common::user(Role::Superadmin, None),
    );

    let res = app.oneshot(get_req("/data", &[])).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = common::body_json(res).await;
    assert!(body["tenant"].is_null());
}

#[tokio::test]
async fn unknown_tenant_hint_is_404_for_regular_users() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        resolver_router(state, false),
        common::user(Role::Teacher, None),
    );

    let res = app
        .oneshot(get_req("/data", &[("x-tenant-id", "t-missing")]))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_tenant_hint_is_tolerated_for_superusers() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        resolver_router(state, false),
        common::user(Role::Superadmin, None),
    );

    let res = app
        .oneshot(get_req("/data", &[("x-tenant-id", "t-missing")]))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn optional_resolution_tolerates_anonymous_requests() {
    let (state, _) = common::test_state(vec![]);
    let app = resolver_router(state, true);

    let res = app.oneshot(get_req("/data", &[])).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn guard_rejects_non_superuser_without_context() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(guard_router(state), common::user(Role::Student, Some("t-alpha")));

    let res = app.oneshot(get_req("/data", &[])).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body = common::body_json(res).await;
    assert_eq!(body["code"], "TENANT_CONTEXT_REQUIRED");
}

#[tokio::test]
async fn guard_rejects_tenant_mismatch_and_audits_it() {
    let (state, audit) = common::test_state(vec![]);
    let app = common::with_tenant_context(
        common::with_user(guard_router(state), common::user(Role::Teacher, Some("t-alpha"))),
        common::tenant("t-beta", "tenant_beta"),
    );

    let res = app.oneshot(get_req("/data", &[])).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body = common::body_json(res).await;
    assert_eq!(body["code"], "TENANT_MISMATCH");

    let attempts = audit.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].reason, "tenant mismatch");
    assert_eq!(attempts[0].details["identity_tenant"], "t-alpha");
    assert_eq!(attempts[0].details["request_tenant"], "t-beta");
}

#[tokio::test]
async fn guard_passes_matching_tenant() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_tenant_context(
        common::with_user(guard_router(state), common::user(Role::Teacher, Some("t-alpha"))),
        common::tenant("t-alpha", "tenant_alpha"),
    );

    let res = app.oneshot(get_req("/data", &[])).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = common::body_json(res).await;
    assert_eq!(body["tenant"], "t-alpha");
}

#[tokio::test]
async fn guard_passes_claimless_identity_with_resolved_tenant() {
    // Header-resolved tenant, identity with no tenant claim to compare
    let (state, _) = common::test_state(vec![]);
    let app = common::with_tenant_context(
        common::with_user(guard_router(state), common::user(Role::Teacher, None)),
        common::tenant("t-123", "tenant_123"),
    );

    let res = app.oneshot(get_req("/data", &[])).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn guard_lets_superuser_through_without_context() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(guard_router(state), common::user(Role::Superadmin, None));

    let res = app.oneshot(get_req("/data", &[])).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
