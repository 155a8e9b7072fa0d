//! 使い捨てトークン（メール認証・パスワードリセット）の共通処理

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::config::Config;

const DEFAULT_VERIFICATION_URL_BASE: &str = "http://localhost:8080/api/auth/verify";
const DEFAULT_PASSWORD_RESET_URL_BASE: &str = "http://localhost:5173/reset-password";

/// トークンの有効期間とリンク生成先
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    pub verification_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub verification_url_base: String,
    pub password_reset_url_base: String,
}

impl TokenPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            verification_ttl: Duration::seconds(config.verification_token_ttl_secs),
            password_reset_ttl: Duration::seconds(config.password_reset_token_ttl_secs),
            verification_url_base: config
                .verification_url_base
                .clone()
                .unwrap_or_else(|| DEFAULT_VERIFICATION_URL_BASE.to_string()),
            password_reset_url_base: config
                .password_reset_url_base
                .clone()
                .unwrap_or_else(|| DEFAULT_PASSWORD_RESET_URL_BASE.to_string()),
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            verification_ttl: Duration::hours(24),
            password_reset_ttl: Duration::hours(1),
            verification_url_base: DEFAULT_VERIFICATION_URL_BASE.to_string(),
            password_reset_url_base: DEFAULT_PASSWORD_RESET_URL_BASE.to_string(),
        }
    }
}

/// 発行済みトークン
///
/// `token` は平文。通知リンクにのみ埋め込み、ログには出力しない。
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// 32バイトのランダムトークンを生成（URL-safe Base64、パディングなし）
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// トークンをSHA256でハッシュ化（16進文字列）
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `base` に token クエリパラメータを付与したリンクを構築
pub fn build_link(base: &str, token: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}token={}", urlencoding::encode(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_url_safe_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32バイト → 43文字（パディングなし）
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_hash_token_is_deterministic_hex() {
        let hash = hash_token("abc");
        assert_eq!(hash, hash_token("abc"));
        assert_ne!(hash, hash_token("abd"));
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_build_link_appends_query() {
        assert_eq!(
            build_link("http://app/verify", "t0k"),
            "http://app/verify?token=t0k"
        );
        assert_eq!(
            build_link("http://app/reset?lang=ja", "t0k"),
            "http://app/reset?lang=ja&token=t0k"
        );
    }

    #[test]
    fn test_default_policy_ttls() {
        let policy = TokenPolicy::default();
        assert_eq!(policy.verification_ttl, Duration::hours(24));
        assert_eq!(policy.password_reset_ttl, Duration::hours(1));
    }
}
