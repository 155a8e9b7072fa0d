use axum::extract::FromRequestParts;
use http::{header::AUTHORIZATION, request::Parts};

use crate::error::AppError;
use crate::state::AppState;

/// Bearer アクセストークンで認証済みのユーザー名
///
/// 検証は署名と有効期限のみ。ユーザーの存在確認は行わない。
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".to_string()))?;

        let claims = state.sessions.validate_access(token)?;
        Ok(Self(claims.sub))
    }
}
