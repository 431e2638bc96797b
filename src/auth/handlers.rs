use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            Ack, AuthResponse, ChangePasswordRequest, CreateUserRequest, LoginRequest,
            PublicUser, RoleQuery, UpdateUserRequest,
        },
        jwt::{AuthUser, JwtKeys},
        repo_types::Role,
        services,
    },
    error::AppError,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/password", put(change_password))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user).get(list_users))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(mut payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.email = services::normalize_email(&payload.email)?;

    let Some(user) = state.users.find_by_email(&payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !state.hasher.verify(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !user.is_active() {
        warn!(user_id = %user.id, "login by inactive user");
        return Err(AppError::Forbidden(
            "Account is inactive; contact your admin".into(),
        ));
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id, user.role)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .find_by_id(auth.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload), fields(user_id = %auth.id))]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> Result<Json<Ack>, AppError> {
    services::change_password(
        state.users.as_ref(),
        state.hasher.as_ref(),
        auth.id,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    Ok(Json(Ack {
        msg: "password changed".into(),
    }))
}

#[instrument(skip(state, payload), fields(actor = %auth.id))]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    auth.require_any(&[Role::Admin])?;
    let user = services::create_user(
        state.users.as_ref(),
        state.hasher.as_ref(),
        &payload.email,
        &payload.password,
        payload.role,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state), fields(actor = %auth.id))]
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    AppQuery(q): AppQuery<RoleQuery>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    auth.require_any(&[Role::Admin])?;
    let users = state.users.list(q.role).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state), fields(actor = %auth.id))]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<PublicUser>, AppError> {
    auth.require_any(&[Role::Admin])?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload), fields(actor = %auth.id))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    auth.require_any(&[Role::Admin])?;
    let user =
        services::update_user(state.users.as_ref(), state.hasher.as_ref(), id, payload).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state), fields(actor = %auth.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Ack>, AppError> {
    auth.require_any(&[Role::Admin])?;
    services::delete_user(state.users.as_ref(), auth.id, id).await?;
    Ok(Json(Ack {
        msg: "deleted".into(),
    }))
}
