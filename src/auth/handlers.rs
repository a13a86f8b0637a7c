use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, PublicUser, RefreshRequest,
            RegisterRequest,
        },
        claims::TokenKind,
        jwt::{AuthUser, JwtKeys},
        password::{hash_password, verify_password},
        repo_types::{User, UserId},
    },
    error::{internal, store_error},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/password", post(change_password))
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^\S{1,64}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

fn issue_tokens(state: &AppState, user: PublicUser) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign(user.id, TokenKind::Access).map_err(internal)?;
    let refresh_token = keys.sign(user.id, TokenKind::Refresh).map_err(internal)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user,
    })
}

fn invalid_credentials() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "Invalid credentials".into())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    if !is_valid_username(&payload.username) {
        warn!(username = %payload.username, "invalid username");
        return Err((StatusCode::BAD_REQUEST, "Invalid username".into()));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let hash = hash_password(&payload.password).map_err(internal)?;
    let user = User::create(&state.db, &payload.username, &hash)
        .await
        .map_err(|e| {
            warn!(error = %e, username = %payload.username, "register failed");
            store_error(e)
        })?;

    info!(user_id = user.id, username = %user.username, "user registered");
    let resp = issue_tokens(&state, user.into())?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let user = match User::find_by_username(&state.db, &payload.username).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(username = %payload.username, "login unknown username");
            return Err(invalid_credentials());
        }
        Err(e) => return Err(store_error(e)),
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(internal)?;
    if !ok {
        warn!(user_id = user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(Json(issue_tokens(&state, user.into())?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let user_id = JwtKeys::from_ref(&state)
        .verify(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
        })?;

    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(store_error)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
    Ok(Json(issue_tokens(&state, user.into())?))
}

async fn current_user(state: &AppState, user_id: UserId) -> Result<User, (StatusCode, String)> {
    User::find_by_id(&state.db, user_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            error!(user_id, "token for missing user");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = current_user(&state, user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let user = current_user(&state, user_id).await?;
    if !verify_password(&payload.old_password, &user.password_hash).map_err(internal)? {
        warn!(user_id, "password change with wrong old password");
        return Err(invalid_credentials());
    }

    let new_hash = hash_password(&payload.new_password).map_err(internal)?;
    // Fails if the stored hash moved since it was read above.
    User::update_password(&state.db, user_id, &user.password_hash, &new_hash)
        .await
        .map_err(store_error)?;

    info!(user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_body(username: &str, password: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            username: username.into(),
            password: password.into(),
        })
    }

    fn login_body(username: &str, password: &str) -> Json<LoginRequest> {
        Json(LoginRequest {
            username: username.into(),
            password: password.into(),
        })
    }

    #[test]
    fn username_rules() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("Dr.Kim_2"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("two words"));
        assert!(!is_valid_username(&"x".repeat(65)));
    }

    #[test]
    fn public_user_serialization_has_no_hash() {
        let json = serde_json::to_string(&PublicUser {
            id: 1,
            username: "alice".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"id":1,"username":"alice"}"#);
    }

    #[tokio::test]
    async fn register_login_and_me() {
        let st = AppState::for_tests().await;
        let (status, Json(reg)) = register(State(st.clone()), register_body("alice", "s3cret-pass"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reg.user.username, "alice");

        let Json(logged) = login(State(st.clone()), login_body("alice", "s3cret-pass"))
            .await
            .unwrap();
        assert_eq!(logged.user, reg.user);

        let Json(me) = get_me(State(st), AuthUser(reg.user.id)).await.unwrap();
        assert_eq!(me.username, "alice");
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let st = AppState::for_tests().await;
        register(State(st.clone()), register_body("alice", "password1"))
            .await
            .unwrap();
        let (status, _) = register(State(st), register_body("alice", "password2"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn short_password_and_bad_username_are_rejected() {
        let st = AppState::for_tests().await;
        let (status, _) = register(State(st.clone()), register_body("alice", "short"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = register(State(st), register_body("a b", "long-enough"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let st = AppState::for_tests().await;
        register(State(st.clone()), register_body("alice", "password1"))
            .await
            .unwrap();

        let wrong = login(State(st.clone()), login_body("alice", "password2"))
            .await
            .unwrap_err();
        let unknown = login(State(st.clone()), login_body("bob", "password1"))
            .await
            .unwrap_err();
        assert_eq!(wrong, unknown);
        assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);

        // usernames are case-sensitive
        let (status, _) = login(State(st), login_body("Alice", "password1"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_issues_new_pair() {
        let st = AppState::for_tests().await;
        let (_, Json(reg)) = register(State(st.clone()), register_body("alice", "password1"))
            .await
            .unwrap();

        let Json(next) = refresh(
            State(st.clone()),
            Json(RefreshRequest {
                refresh_token: reg.refresh_token,
            }),
        )
        .await
        .unwrap();
        assert_eq!(next.user.id, reg.user.id);

        let (status, _) = refresh(
            State(st),
            Json(RefreshRequest {
                refresh_token: reg.access_token,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn change_password_requires_old_password() {
        let st = AppState::for_tests().await;
        let (_, Json(reg)) = register(State(st.clone()), register_body("alice", "password1"))
            .await
            .unwrap();
        let id = reg.user.id;

        let (status, _) = change_password(
            State(st.clone()),
            AuthUser(id),
            Json(ChangePasswordRequest {
                old_password: "nope-nope".into(),
                new_password: "password2".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let status = change_password(
            State(st.clone()),
            AuthUser(id),
            Json(ChangePasswordRequest {
                old_password: "password1".into(),
                new_password: "password2".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        assert!(login(State(st.clone()), login_body("alice", "password1"))
            .await
            .is_err());
        login(State(st), login_body("alice", "password2"))
            .await
            .unwrap();
    }
}
