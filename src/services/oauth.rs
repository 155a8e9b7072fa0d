use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, OsRng},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::services::federated::{IdentityAssertion, IdentityProvider};

/// Google OAuth URLs
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// state の有効期間（秒）
const STATE_TTL_SECS: i64 = 600;

/// Google トークンエンドポイントからのレスポンス
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

/// Google userinfo エンドポイントからのレスポンス
#[derive(Debug, Deserialize)]
struct GoogleUserInfoResponse {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl From<GoogleUserInfoResponse> for IdentityAssertion {
    fn from(info: GoogleUserInfoResponse) -> Self {
        Self {
            provider: IdentityProvider::Google,
            subject: Some(info.id),
            email: info.email,
            name: info.name,
            avatar_url: info.picture,
        }
    }
}

/// Google OAuth サービス
///
/// # Security
/// - client_secret はログに出力しない
/// - state パラメータは AES-256-GCM で暗号化（ランダム値 + 発行時刻）
#[derive(Clone)]
pub struct GoogleOAuthService {
    client_id: String,
    /// クライアントシークレット（機密情報 - ログ出力禁止）
    client_secret: Arc<String>,
    redirect_uri: String,
    state_encryption_key: [u8; 32],
    http_client: reqwest::Client,
}

impl GoogleOAuthService {
    /// 新しい GoogleOAuthService を作成
    ///
    /// # Arguments
    /// * `client_id` - Google OAuth クライアントID
    /// * `client_secret` - Google OAuth クライアントシークレット（機密情報）
    /// * `redirect_uri` - OAuth コールバック URI
    /// * `state_secret_base64` - Base64エンコードされた32バイトの暗号化キー
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        state_secret_base64: &str,
    ) -> Result<Self, AppError> {
        let key_bytes = URL_SAFE_NO_PAD
            .decode(state_secret_base64)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(state_secret_base64))
            .map_err(|e| {
                tracing::error!(error = ?e, "OAuth state暗号化キーのBase64デコードエラー");
                AppError::Internal(anyhow::anyhow!("invalid state encryption key format"))
            })?;

        let state_encryption_key: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
            tracing::error!(
                expected = 32,
                actual = key_bytes.len(),
                "OAuth state暗号化キーの長さが不正"
            );
            AppError::Internal(anyhow::anyhow!("state encryption key must be 32 bytes"))
        })?;

        Ok(Self {
            client_id,
            client_secret: Arc::new(client_secret),
            redirect_uri,
            state_encryption_key,
            http_client: reqwest::Client::new(),
        })
    }

    /// Google OAuth 認可 URL を生成
    pub fn generate_auth_url(&self) -> Result<String, AppError> {
        let state = self.issue_state(OffsetDateTime::now_utc())?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("state", &state),
            ("access_type", "online"),
            ("prompt", "select_account"),
        ];

        let url = reqwest::Url::parse_with_params(GOOGLE_AUTH_URL, &params).map_err(|e| {
            tracing::error!(error = ?e, "OAuth認可URL生成エラー");
            AppError::Internal(anyhow::anyhow!("failed to generate auth url"))
        })?;

        Ok(url.to_string())
    }

    /// コールバックで受け取った state を検証
    pub fn verify_state(&self, state: &str) -> Result<(), AppError> {
        self.verify_state_at(state, OffsetDateTime::now_utc())
    }

    fn issue_state(&self, now: OffsetDateTime) -> Result<String, AppError> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let payload = format!("{}.{}", URL_SAFE_NO_PAD.encode(nonce), now.unix_timestamp());
        self.encrypt_state(&payload)
    }

    fn verify_state_at(&self, state: &str, now: OffsetDateTime) -> Result<(), AppError> {
        let payload = self.decrypt_state(state)?;
        let issued_at = payload
            .rsplit_once('.')
            .and_then(|(_, ts)| ts.parse::<i64>().ok())
            .ok_or_else(|| {
                tracing::warn!("state の形式が不正");
                AppError::OAuthStateInvalid
            })?;

        let age = now.unix_timestamp() - issued_at;
        if !(0..=STATE_TTL_SECS).contains(&age) {
            tracing::warn!(age, "期限切れの OAuth state");
            return Err(AppError::OAuthStateInvalid);
        }
        Ok(())
    }

    /// 認可コードをアクセストークンに交換
    ///
    /// # Arguments
    /// * `code` - Google から受け取った認可コード
    pub async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        // application/x-www-form-urlencoded 形式で body を構築
        let body = format!(
            "client_id={}&client_secret={}&code={}&grant_type=authorization_code&redirect_uri={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(self.client_secret.as_str()),
            urlencoding::encode(code),
            urlencoding::encode(&self.redirect_uri),
        );

        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Googleトークンエンドポイント通信エラー");
                AppError::OAuthProviderError
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "Googleトークン交換エラー");
            return Err(AppError::OAuthError(format!(
                "token exchange failed: {status}"
            )));
        }

        let token_response: GoogleTokenResponse = response.json().await.map_err(|e| {
            tracing::error!(error = ?e, "Googleトークンレスポンスのパースエラー");
            AppError::OAuthError("invalid token response".to_string())
        })?;

        Ok(token_response.access_token)
    }

    /// アクセストークンを使用して本人情報を取得
    pub async fn get_user_info(&self, access_token: &str) -> Result<IdentityAssertion, AppError> {
        let response = self
            .http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Google userinfo API通信エラー");
                AppError::OAuthProviderError
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "Google userinfo取得エラー");
            return Err(AppError::OAuthError(format!(
                "userinfo request failed: {status}"
            )));
        }

        let user_info: GoogleUserInfoResponse = response.json().await.map_err(|e| {
            tracing::error!(error = ?e, "Google userinfoレスポンスのパースエラー");
            AppError::OAuthError("invalid userinfo response".to_string())
        })?;

        Ok(user_info.into())
    }

    /// AES-256-GCM で暗号化し、nonce + 暗号文を Base64 URL-safe エンコード
    fn encrypt_state(&self, payload: &str) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new_from_slice(&self.state_encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, payload.as_bytes()).map_err(|e| {
            tracing::error!(error = ?e, "state暗号化エラー");
            AppError::Internal(anyhow::anyhow!("state encryption error"))
        })?;

        let mut combined = Vec::with_capacity(12 + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(&combined))
    }

    fn decrypt_state(&self, encrypted_state: &str) -> Result<String, AppError> {
        let encrypted = URL_SAFE_NO_PAD.decode(encrypted_state).map_err(|e| {
            tracing::warn!(error = ?e, "state Base64デコードエラー（改ざんの可能性）");
            AppError::OAuthStateInvalid
        })?;

        if encrypted.len() < 12 {
            tracing::warn!(
                len = encrypted.len(),
                "暗号化stateが短すぎる（改ざんの可能性）"
            );
            return Err(AppError::OAuthStateInvalid);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.state_encryption_key).map_err(|e| {
            tracing::error!(error = ?e, "AES-GCM暗号化器の初期化エラー");
            AppError::Internal(anyhow::anyhow!("cipher initialization error"))
        })?;

        let (nonce_bytes, ciphertext) = encrypted.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|e| {
            tracing::warn!(error = ?e, "state復号エラー（改ざんの可能性）");
            AppError::OAuthStateInvalid
        })?;

        String::from_utf8(plaintext).map_err(|e| {
            tracing::warn!(error = ?e, "復号stateのUTF-8変換エラー");
            AppError::OAuthStateInvalid
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use time::Duration;

    fn create_test_service() -> GoogleOAuthService {
        GoogleOAuthService::new(
            "test-client-id".to_string(),
            "test-client-secret".to_string(),
            "http://localhost:8080/api/oauth2/google/callback".to_string(),
            &STANDARD.encode([7u8; 32]),
        )
        .unwrap()
    }

    #[test]
    fn test_state_round_trip_within_ttl() {
        let service = create_test_service();
        let now = OffsetDateTime::now_utc();
        let state = service.issue_state(now).unwrap();
        assert!(!state.contains('+'));
        assert!(!state.contains('/'));

        service.verify_state_at(&state, now).unwrap();
        service
            .verify_state_at(&state, now + Duration::minutes(9))
            .unwrap();
    }

    #[test]
    fn test_state_expires_after_ten_minutes() {
        let service = create_test_service();
        let now = OffsetDateTime::now_utc();
        let state = service.issue_state(now).unwrap();

        let result = service.verify_state_at(&state, now + Duration::minutes(11));
        assert!(matches!(result, Err(AppError::OAuthStateInvalid)));
    }

    #[test]
    fn test_tampered_or_foreign_state_is_rejected() {
        let service = create_test_service();

        assert!(matches!(
            service.verify_state("not-valid-base64!!!"),
            Err(AppError::OAuthStateInvalid)
        ));
        assert!(matches!(
            service.verify_state(&URL_SAFE_NO_PAD.encode([0u8; 5])),
            Err(AppError::OAuthStateInvalid)
        ));
        assert!(matches!(
            service.verify_state(&URL_SAFE_NO_PAD.encode([0u8; 50])),
            Err(AppError::OAuthStateInvalid)
        ));

        let other = GoogleOAuthService::new(
            "test-client-id".to_string(),
            "test-client-secret".to_string(),
            "http://localhost/callback".to_string(),
            &STANDARD.encode([9u8; 32]),
        )
        .unwrap();
        let state = other.issue_state(OffsetDateTime::now_utc()).unwrap();
        assert!(service.verify_state(&state).is_err());
    }

    #[test]
    fn test_generate_auth_url() {
        let service = create_test_service();
        let url = service.generate_auth_url().unwrap();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=test-client-id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("state="));
        assert!(url.contains("redirect_uri="));
    }

    #[test]
    fn test_new_rejects_bad_keys() {
        let short_key = STANDARD.encode([0u8; 16]);
        assert!(
            GoogleOAuthService::new("id".into(), "secret".into(), "http://cb".into(), &short_key)
                .is_err()
        );
        assert!(
            GoogleOAuthService::new(
                "id".into(),
                "secret".into(),
                "http://cb".into(),
                "not-valid-base64!!!"
            )
            .is_err()
        );
    }

    #[test]
    fn test_userinfo_maps_to_assertion() {
        let info: GoogleUserInfoResponse = serde_json::from_value(serde_json::json!({
            "id": "1234",
            "email": "olga@example.com",
            "name": "Olga",
            "picture": "https://img.example.com/o.png"
        }))
        .unwrap();
        let assertion = IdentityAssertion::from(info);
        assert_eq!(assertion.provider, IdentityProvider::Google);
        assert_eq!(assertion.subject.as_deref(), Some("1234"));
        assert_eq!(assertion.email.as_deref(), Some("olga@example.com"));
        assert_eq!(assertion.avatar_url.as_deref(), Some("https://img.example.com/o.png"));

        let info: GoogleUserInfoResponse =
            serde_json::from_value(serde_json::json!({ "id": "5678" })).unwrap();
        assert!(IdentityAssertion::from(info).email.is_none());
    }
}
