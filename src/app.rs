use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::Role;
use crate::handlers;
use crate::middleware::{
    authenticate, enforce_role_hierarchy, require_role, require_self_or_permission,
    resolve_tenant, tenant_isolation_guard,
};
use crate::state::AppState;

/// Assemble the full router. The protected subtree runs the chain
/// authenticate -> resolve-tenant -> isolation-guard before any route-level
/// authorization gate or handler.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/whoami", get(handlers::auth::whoami))
        .route("/api/auth/permissions", get(handlers::auth::my_permissions))
        .route("/api/students", get(handlers::students::list_students))
        .route(
            "/api/students/:id",
            get(handlers::students::get_student).route_layer(from_fn_with_state(
                state.clone(),
                require_self_or_permission(Some("students:read"), "id"),
            )),
        )
        .route(
            "/api/users/:id/role",
            post(handlers::users::assign_role)
                .route_layer(from_fn_with_state(
                    state.clone(),
                    enforce_role_hierarchy("role"),
                ))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    require_role(&[Role::Admin]),
                )),
        )
        .layer(from_fn_with_state(state.clone(), tenant_isolation_guard))
        .layer(from_fn_with_state(state.clone(), resolve_tenant))
        .layer(from_fn_with_state(state.clone(), authenticate));

    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/login", post(handlers::auth::login))
        .merge(protected)
        .layer(TraceLayer::new_for_http());

    if state.config.security.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Campus API",
            "version": version,
            "description": "Multi-tenant school management backend",
            "endpoints": {
                "home": "/ (public)",
                "login": "/auth/login (public - token acquisition)",
                "auth": "/api/auth/* (protected)",
                "students": "/api/students[/:id] (protected)",
                "users": "/api/users/:id/role (protected, admin)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match crate::database::health_check(&state.pool).await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
