//! セッション（JWT）の発行と検証
//!
//! 検証は署名と有効期限のみで行い、ストアは参照しない。

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::config::Config;
use crate::error::AppError;

const VALIDATION_LEEWAY_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// ユーザー名
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            access_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        }
    }
}

/// ログイン・リフレッシュ時に返すトークンの組
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// アクセストークンの有効秒数
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    settings: SessionSettings,
}

impl SessionIssuer {
    pub fn new(secret: &[u8], settings: SessionSettings) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.jwt_secret.expose_secret().as_bytes(),
            SessionSettings::from_config(config),
        )
    }

    fn sign(&self, username: &str, kind: TokenKind) -> Result<String, AppError> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.settings.access_ttl,
            TokenKind::Refresh => self.settings.refresh_ttl,
        };
        let claims = Claims {
            sub: username.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            kind,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| {
            tracing::error!(error = ?e, "JWT署名エラー");
            AppError::Internal(anyhow::anyhow!("failed to sign session token"))
        })
    }

    /// アクセストークンとリフレッシュトークンを発行
    pub fn issue(&self, username: &str) -> Result<SessionTokens, AppError> {
        let tokens = SessionTokens {
            access_token: self.sign(username, TokenKind::Access)?,
            refresh_token: self.sign(username, TokenKind::Refresh)?,
            token_type: "Bearer",
            expires_in: self.settings.access_ttl.whole_seconds(),
        };
        tracing::debug!(username = %username, "セッショントークン発行");
        Ok(tokens)
    }

    /// 署名・発行者・受信者・有効期限を検証
    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.leeway = VALIDATION_LEEWAY_SECS;
        validation.set_audience(std::slice::from_ref(&self.settings.audience));
        validation.set_issuer(std::slice::from_ref(&self.settings.issuer));

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = ?e, "JWT検証失敗");
            AppError::Unauthorized("Invalid or expired token".to_string())
        })?;
        Ok(data.claims)
    }

    pub fn validate_access(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.validate(token)?;
        if claims.kind != TokenKind::Access {
            return Err(AppError::Unauthorized("Access token required".to_string()));
        }
        Ok(claims)
    }

    /// リフレッシュトークンから新しいトークンの組を発行
    pub fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AppError> {
        let claims = self.validate(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AppError::Unauthorized("Refresh token required".to_string()));
        }
        self.issue(&claims.sub)
    }
}
