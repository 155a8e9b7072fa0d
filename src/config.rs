use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // セッション（JWT）設定
    pub jwt_secret: SecretBox<String>,
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,
    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_refresh_token_ttl_secs")]
    pub refresh_token_ttl_secs: i64,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,

    // メール認証・パスワードリセット設定
    #[serde(default)]
    pub verification_url_base: Option<String>,
    #[serde(default = "default_verification_token_ttl_secs")]
    pub verification_token_ttl_secs: i64,
    #[serde(default)]
    pub password_reset_url_base: Option<String>,
    #[serde(default = "default_password_reset_token_ttl_secs")]
    pub password_reset_token_ttl_secs: i64,

    // OAuth2 ソーシャルログイン設定
    /// OAuthステート暗号化用シークレット（Base64、32バイト）
    pub oauth_state_secret: Option<SecretBox<String>>,
    #[serde(default)]
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<SecretBox<String>>,
    #[serde(default)]
    pub google_redirect_uri: Option<String>,
    /// ソーシャルログイン完了後にトークンを渡すフロントエンドURL
    #[serde(default = "default_oauth_success_redirect_uri")]
    pub oauth_success_redirect_uri: String,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_JWT_ISSUER: &str = "ledgerguard";
const DEFAULT_JWT_AUDIENCE: &str = "ledgerguard-users";
const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 86_400;
const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 604_800;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_VERIFICATION_TOKEN_TTL_SECS: i64 = 86_400;
const DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_OAUTH_SUCCESS_REDIRECT_URI: &str = "http://localhost:3000/oauth2/redirect";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_jwt_issuer() -> String {
    DEFAULT_JWT_ISSUER.to_string()
}

fn default_jwt_audience() -> String {
    DEFAULT_JWT_AUDIENCE.to_string()
}

fn default_access_token_ttl_secs() -> i64 {
    DEFAULT_ACCESS_TOKEN_TTL_SECS
}

fn default_refresh_token_ttl_secs() -> i64 {
    DEFAULT_REFRESH_TOKEN_TTL_SECS
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_verification_token_ttl_secs() -> i64 {
    DEFAULT_VERIFICATION_TOKEN_TTL_SECS
}

fn default_password_reset_token_ttl_secs() -> i64 {
    DEFAULT_PASSWORD_RESET_TOKEN_TTL_SECS
}

fn default_oauth_success_redirect_uri() -> String {
    DEFAULT_OAUTH_SUCCESS_REDIRECT_URI.to_string()
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// 任意のキー/値の組から設定を読み込む（テスト・組み込み用）
    pub fn load_from<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(vars)
    }

    /// SMTP送信に必要な項目がすべて揃っているか
    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some()
            && self.smtp_username.is_some()
            && self.smtp_password.is_some()
            && self.smtp_from_address.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_applies_defaults() {
        let config = Config::load_from(vars(&[
            ("DATABASE_URL", "postgres://localhost/ledgerguard"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.jwt_issuer, DEFAULT_JWT_ISSUER);
        assert_eq!(config.verification_token_ttl_secs, 86_400);
        assert_eq!(config.password_reset_token_ttl_secs, 3600);
        assert_eq!(config.jwt_secret.expose_secret(), "secret");
        assert!(!config.smtp_configured());
    }

    #[test]
    fn test_load_requires_jwt_secret() {
        let result = Config::load_from(vars(&[(
            "DATABASE_URL",
            "postgres://localhost/ledgerguard",
        )]));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_overrides_ttls() {
        let config = Config::load_from(vars(&[
            ("DATABASE_URL", "postgres://localhost/ledgerguard"),
            ("JWT_SECRET", "secret"),
            ("PASSWORD_RESET_TOKEN_TTL_SECS", "600"),
            ("PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.password_reset_token_ttl_secs, 600);
        assert_eq!(config.port, 9000);
    }
}
