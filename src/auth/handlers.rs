use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, instrument};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, OnboardingRequest, PublicUser, RefreshRequest,
            RegisterRequest, TargetWeightRequest, WeightData, WeightRequest,
        },
        extractors::AuthUser,
        services::AuthError,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/onboarding", put(put_onboarding))
        .route("/me/weight", get(get_weight).post(post_weight))
        .route("/me/weight/target", put(put_target_weight))
}

fn reject(e: AuthError) -> (StatusCode, String) {
    let status = match &e {
        AuthError::InvalidEmail | AuthError::WeakPassword | AuthError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::Internal(inner) => {
            error!(error = %inner, "auth operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    let res = state
        .auth
        .register(&payload.email, &payload.password, &payload.name, payload.role)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    state
        .auth
        .login(&payload.email, &payload.password)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    state
        .auth
        .refresh(&payload.refresh_token)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    state.auth.logout().await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    state.auth.me(user_id).await.map(Json).map_err(reject)
}

#[instrument(skip(state, payload))]
pub async fn put_onboarding(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<OnboardingRequest>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    state
        .auth
        .update_onboarding(user_id, payload)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn get_weight(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<WeightData>, (StatusCode, String)> {
    state.auth.weight_data(user_id).await.map(Json).map_err(reject)
}

#[instrument(skip(state))]
pub async fn post_weight(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<WeightRequest>,
) -> Result<Json<WeightData>, (StatusCode, String)> {
    state
        .auth
        .add_weight_entry(user_id, payload.weight)
        .await
        .map(Json)
        .map_err(reject)
}

#[instrument(skip(state))]
pub async fn put_target_weight(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<TargetWeightRequest>,
) -> Result<Json<WeightData>, (StatusCode, String)> {
    state
        .auth
        .update_target_weight(user_id, payload.target_weight)
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
mod route_tests {
    use axum::http::{header, HeaderValue};
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use crate::app::build_app;
    use crate::state::AppState;

    fn server() -> TestServer {
        TestServer::new(build_app(AppState::fake())).unwrap()
    }

    async fn register(server: &TestServer) -> Value {
        let res = server
            .post("/api/v1/auth/register")
            .json(&json!({"email": "ana@example.com", "password": "hunter22", "name": "Ana"}))
            .await;
        res.assert_status(axum::http::StatusCode::CREATED);
        res.json::<Value>()
    }

    fn bearer(token: &Value) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", token.as_str().unwrap())).unwrap()
    }

    #[tokio::test]
    async fn register_then_me() {
        let server = server();
        let body = register(&server).await;
        let me = server
            .get("/api/v1/me")
            .add_header(header::AUTHORIZATION, bearer(&body["access_token"]))
            .await;
        me.assert_status_ok();
        let me = me.json::<Value>();
        assert_eq!(me["email"], "ana@example.com");
        assert_eq!(me["onboardingCompleted"], false);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let server = server();
        register(&server).await;
        let res = server
            .post("/api/v1/auth/register")
            .json(&json!({"email": "ana@example.com", "password": "hunter22"}))
            .await;
        res.assert_status(axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let server = server();
        register(&server).await;
        let res = server
            .post("/api/v1/auth/login")
            .json(&json!({"email": "ana@example.com", "password": "nope-nope"}))
            .await;
        res.assert_status(axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(res.text(), "Invalid email or password");
    }

    #[tokio::test]
    async fn me_requires_access_token() {
        let server = server();
        let body = register(&server).await;
        server.get("/api/v1/me").await.assert_status(axum::http::StatusCode::UNAUTHORIZED);
        server
            .get("/api/v1/me")
            .add_header(header::AUTHORIZATION, bearer(&body["refresh_token"]))
            .await
            .assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn onboarding_and_weight_tracking() {
        let server = server();
        let body = register(&server).await;
        let auth = bearer(&body["access_token"]);

        server
            .put("/api/v1/me/onboarding")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&json!({
                "weight": 80.0,
                "height": 180.0,
                "birthdate": "1990-01-01",
                "gender": "female",
                "fitnessGoal": "lose_weight"
            }))
            .await
            .assert_status_ok();

        server
            .post("/api/v1/me/weight")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&json!({"weight": 79.5}))
            .await
            .assert_status_ok();

        let data = server
            .put("/api/v1/me/weight/target")
            .add_header(header::AUTHORIZATION, auth)
            .json(&json!({"targetWeight": 72.0}))
            .await
            .json::<Value>();
        assert_eq!(data["currentWeight"], 79.5);
        assert_eq!(data["targetWeight"], 72.0);
        assert_eq!(data["weightHistory"].as_array().unwrap().len(), 2);
    }
}
