use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use super::claims::{Claims, TokenKind};
use super::repo_types::UserId;
use crate::state::AppState;

/// Signing material and token settings derived from [`crate::config::JwtConfig`].
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let jwt = &state.config.jwt;
        Self {
            encoding: EncodingKey::from_secret(jwt.secret.as_bytes()),
            decoding: DecodingKey::from_secret(jwt.secret.as_bytes()),
            issuer: jwt.issuer.clone(),
            audience: jwt.audience.clone(),
            access_ttl: Duration::minutes(jwt.ttl_minutes),
            refresh_ttl: Duration::minutes(jwt.refresh_ttl_minutes),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, user_id: UserId, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Check signature, expiry, issuer, audience and token kind; yields the user id.
    pub fn verify(&self, token: &str, expected: TokenKind) -> anyhow::Result<UserId> {
        let mut validation = Validation::default();
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        anyhow::ensure!(
            claims.kind == expected,
            "expected {expected:?} token, got {:?}",
            claims.kind
        );
        debug!(user_id = claims.sub, kind = ?claims.kind, "jwt verified");
        Ok(claims.sub)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
}

/// Session context of an authenticated request: the caller's user id.
///
/// Every experiment store call receives this id explicitly.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing bearer token".to_string(),
        ))?;

        JwtKeys::from_ref(state)
            .verify(token, TokenKind::Access)
            .map(AuthUser)
            .map_err(|e| {
                warn!(error = %e, "access token rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_ref(&AppState::fake_with_jwt(secret, issuer, audience))
    }

    async fn extract(state: &AppState, header: Option<String>) -> Result<UserId, StatusCode> {
        let mut builder = Request::builder().uri("/me");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, state)
            .await
            .map(|AuthUser(id)| id)
            .map_err(|(status, _)| status)
    }

    #[tokio::test]
    async fn tokens_verify_only_as_their_own_kind() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let access = keys.sign(7, TokenKind::Access).unwrap();
        let refresh = keys.sign(3, TokenKind::Refresh).unwrap();

        assert_eq!(keys.verify(&access, TokenKind::Access).unwrap(), 7);
        assert_eq!(keys.verify(&refresh, TokenKind::Refresh).unwrap(), 3);
        assert!(keys.verify(&access, TokenKind::Refresh).is_err());
        assert!(keys.verify(&refresh, TokenKind::Access).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.sign(1, TokenKind::Access).unwrap();
        assert!(bad_keys.verify(&token, TokenKind::Access).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_other_secret() {
        let token = make_keys("one", "i", "a").sign(1, TokenKind::Access).unwrap();
        assert!(make_keys("two", "i", "a").verify(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, "bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn extractor_yields_user_id_for_access_token() {
        let state = AppState::fake_with_jwt("s", "i", "a");
        let token = JwtKeys::from_ref(&state).sign(11, TokenKind::Access).unwrap();
        assert_eq!(extract(&state, Some(format!("Bearer {token}"))).await, Ok(11));
    }

    #[tokio::test]
    async fn extractor_rejects_missing_or_refresh_tokens() {
        let state = AppState::fake_with_jwt("s", "i", "a");
        assert_eq!(extract(&state, None).await, Err(StatusCode::UNAUTHORIZED));

        let refresh = JwtKeys::from_ref(&state).sign(11, TokenKind::Refresh).unwrap();
        assert_eq!(
            extract(&state, Some(format!("Bearer {refresh}"))).await,
            Err(StatusCode::UNAUTHORIZED)
        );
    }
}
