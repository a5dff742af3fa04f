mod common;

use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt;

use campus_api::auth::Role;
use campus_api::middleware::{
    enforce_role_hierarchy, require_all_permissions, require_any_permission, require_permission,
    require_role, require_self_or_permission, require_superuser,
};
use campus_api::state::AppState;

async fn ok() -> &'static str {
    "ok"
}

fn gated_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/admin",
            get(ok).route_layer(from_fn_with_state(
                state.clone(),
                require_role(&[Role::Admin]),
            )),
        )
        .route(
            "/manage-users",
            get(ok).route_layer(from_fn_with_state(
                state.clone(),
                require_permission("users:manage"),
            )),
        )
        .route(
            "/any",
            get(ok).route_layer(from_fn_with_state(
                state.clone(),
                require_any_permission(&["users:manage", "exams:manage"]),
            )),
        )
        .route(
            "/all",
            get(ok).route_layer(from_fn_with_state(
                state.clone(),
                require_all_permissions(&["users:manage", "exams:manage"]),
            )),
        )
        .route(
            "/super",
            get(ok).route_layer(from_fn_with_state(state.clone(), require_superuser)),
        )
        .route(
            "/assign",
            post(ok).route_layer(from_fn_with_state(
                state.clone(),
                enforce_role_hierarchy("role"),
            )),
        )
        .route(
            "/students/:id",
            get(ok).route_layer(from_fn_with_state(
                state.clone(),
                require_self_or_permission(Some("students:read"), "id"),
            )),
        )
        .route(
            "/noid",
            get(ok).route_layer(from_fn_with_state(
                state,
                require_self_or_permission(Some("students:read"), "id"),
            )),
        )
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn admin_route_admits_admin_and_superadmin() {
    for role in [Role::Admin, Role::Superadmin] {
        let (state, _) = common::test_state(vec![]);
        let app = common::with_user(gated_router(state), common::user(role, Some("t-alpha")));
        let res = app.oneshot(get_req("/admin")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "role {:?}", role);
    }
}

#[tokio::test]
async fn admin_route_denies_teacher_and_audits() {
    let (state, audit) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Teacher, Some("t-alpha")),
    );

    let res = app.oneshot(get_req("/admin")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body = common::body_json(res).await;
    assert_eq!(body["code"], "FORBIDDEN");

    let attempts = audit.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].reason, "role not permitted");
    assert_eq!(attempts[0].path, "/admin");
}

#[tokio::test]
async fn unauthenticated_gate_is_401_not_403() {
    let (state, audit) = common::test_state(vec![]);
    let app = gated_router(state);

    let res = app.oneshot(get_req("/admin")).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    // No identity to attribute, nothing audited
    assert!(audit.attempts().is_empty());
}

#[tokio::test]
async fn permission_gate_denies_student_with_reason() {
    let (state, audit) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Student, Some("t-alpha")),
    );

    let res = app.oneshot(get_req("/manage-users")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let attempts = audit.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].reason.contains("users:manage"));
}

#[tokio::test]
async fn permission_gate_admits_admin() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Admin, Some("t-alpha")),
    );

    let res = app.oneshot(get_req("/manage-users")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn any_permission_admits_partial_holder() {
    // Teachers manage exams but not users
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Teacher, Some("t-alpha")),
    );

    let res = app.oneshot(get_req("/any")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn all_permissions_denies_partial_holder() {
    let (state, audit) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Teacher, Some("t-alpha")),
    );

    let res = app.oneshot(get_req("/all")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(audit.attempts().len(), 1);
}

#[tokio::test]
async fn superuser_route_denies_admin() {
    let (state, audit) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Admin, Some("t-alpha")),
    );

    let res = app.oneshot(get_req("/super")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body = common::body_json(res).await;
    assert_eq!(body["message"], "Superadmin role required");
    assert_eq!(audit.attempts().len(), 1);
}

#[tokio::test]
async fn superuser_route_admits_superadmin() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(gated_router(state), common::user(Role::Superadmin, None));

    let res = app.oneshot(get_req("/super")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn hierarchy_blocks_assigning_equal_or_higher_role() {
    let (state, audit) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Admin, Some("t-alpha")),
    );

    let res = app
        .oneshot(post_json("/assign", r#"{"role": "superadmin"}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body = common::body_json(res).await;
    assert_eq!(
        body["message"],
        "Cannot assign role equal to or higher than your own"
    );

    let attempts = audit.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].reason, "role hierarchy violation");
    assert_eq!(attempts[0].details["user_level"], 4);
    assert_eq!(attempts[0].details["target_level"], 5);
}

#[tokio::test]
async fn hierarchy_allows_assigning_lower_role() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Admin, Some("t-alpha")),
    );

    let res = app
        .oneshot(post_json("/assign", r#"{"role": "teacher"}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn hierarchy_blocks_teacher_assigning_admin() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Teacher, Some("t-alpha")),
    );

    let res = app
        .oneshot(post_json("/assign", r#"{"role": "admin"}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn hierarchy_ignores_requests_without_role_field() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Admin, Some("t-alpha")),
    );

    let res = app
        .oneshot(post_json("/assign", r#"{"note": "no role here"}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn hierarchy_rejects_unknown_role_name() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Admin, Some("t-alpha")),
    );

    let res = app
        .oneshot(post_json("/assign", r#"{"role": "principal"}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = common::body_json(res).await;
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn hierarchy_reads_role_from_query_string() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Admin, Some("t-alpha")),
    );

    let res = app
        .oneshot(post_json("/assign?role=superadmin", ""))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn self_access_passes_without_permission() {
    let (state, _) = common::test_state(vec![]);
    let student = common::user(Role::Student, Some("t-alpha"));
    let id = student.id;
    let app = common::with_user(gated_router(state), student);

    let res = app
        .oneshot(get_req(&format!("/students/{}", id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn permission_holder_passes_for_other_target() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Teacher, Some("t-alpha")),
    );

    let res = app
        .oneshot(get_req(&format!("/students/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn student_denied_other_target_with_tenant_context() {
    let (state, audit) = common::test_state(vec![]);
    let app = common::with_tenant_context(
        common::with_user(
            gated_router(state),
            common::user(Role::Student, Some("t-alpha")),
        ),
        common::tenant("t-alpha", "tenant_alpha"),
    );

    let res = app
        .oneshot(get_req(&format!("/students/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let attempts = audit.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].reason.contains("students:read"));
}

#[tokio::test]
async fn student_denied_other_target_without_tenant_context() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Student, Some("t-alpha")),
    );

    let res = app
        .oneshot(get_req(&format!("/students/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = common::body_json(res).await;
    assert_eq!(body["code"], "TENANT_CONTEXT_MISSING");
}

#[tokio::test]
async fn missing_target_id_fails_fast() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(
        gated_router(state),
        common::user(Role::Student, Some("t-alpha")),
    );

    let res = app.oneshot(get_req("/noid")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = common::body_json(res).await;
    assert_eq!(body["code"], "MISSING_TARGET_ID");
}

#[tokio::test]
async fn superuser_bypasses_self_check() {
    let (state, _) = common::test_state(vec![]);
    let app = common::with_user(gated_router(state), common::user(Role::Superadmin, None));

    let res = app
        .oneshot(get_req(&format!("/students/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
