use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::AppError;

/// 通知の送信口
///
/// 失敗はリトライせず、呼び出し元の操作のエラーとして返す。
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

/// メール送信サービス
///
/// SMTP 未設定時（または `email` feature 無効時）はログ出力のみ。
#[derive(Clone)]
pub struct EmailService {
    config: Arc<Config>,
}

impl EmailService {
    /// 新しい EmailService を作成
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// 実際にメールが配信されるか（SMTP 設定済みかつ `email` feature 有効）
    pub fn delivers_mail(&self) -> bool {
        cfg!(feature = "email") && self.config.smtp_configured()
    }

    #[cfg(feature = "email")]
    async fn send_smtp(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        use lettre::message::header::ContentType;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
        use secrecy::ExposeSecret;

        let (Some(host), Some(username), Some(password), Some(from)) = (
            self.config.smtp_host.as_deref(),
            self.config.smtp_username.as_ref(),
            self.config.smtp_password.as_ref(),
            self.config.smtp_from_address.as_deref(),
        ) else {
            return Err(AppError::Notification("SMTP is not configured".to_string()));
        };

        let message = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| AppError::Notification(format!("invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| AppError::Notification(format!("invalid recipient: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| AppError::Notification(e.to_string()))?;

        let credentials = Credentials::new(
            username.expose_secret().clone(),
            password.expose_secret().clone(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Notification(e.to_string()))?
            .port(self.config.smtp_port)
            .credentials(credentials)
            .build();

        mailer.send(message).await.map_err(|e| {
            tracing::error!(error = ?e, "SMTP送信エラー");
            AppError::Notification(e.to_string())
        })?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailService {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        #[cfg(feature = "email")]
        if self.config.smtp_configured() {
            self.send_smtp(to, subject, body).await?;
            tracing::info!(to = %to, subject = %subject, "メール送信完了");
            return Ok(());
        }

        // 開発モード: メール送信せずログ出力のみ（本文にはトークンが含まれるため出さない）
        tracing::info!(
            to = %to,
            subject = %subject,
            body_len = body.len(),
            smtp_configured = self.config.smtp_configured(),
            "メール送信（開発モード）"
        );
        Ok(())
    }
}

/// 送信内容を記録するだけの Notifier（テスト・ローカル検証用）
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl SentMessage {
    /// 本文のリンクに埋め込まれた token クエリパラメータ
    pub fn token(&self) -> Option<String> {
        let start = self.body.find("token=")? + "token=".len();
        let rest = &self.body[start..];
        let end = rest
            .find(|c: char| c == '"' || c == '&' || c == '<' || c.is_whitespace())
            .unwrap_or(rest.len());
        urlencoding::decode(&rest[..end])
            .ok()
            .map(|token| token.into_owned())
    }
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn last_to(&self, to: &str) -> Option<SentMessage> {
        self.sent.lock().iter().rev().find(|m| m.to == to).cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        self.sent.lock().push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// 常に失敗する Notifier（テスト用）
#[derive(Clone, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), AppError> {
        Err(AppError::Notification("mail relay unavailable".to_string()))
    }
}

/// メール認証メッセージ（件名, 本文）
pub fn verification_message(full_name: &str, link: &str) -> (String, String) {
    let subject = "Verify your email address".to_string();
    let body = format!(
        "<p>Hello {full_name},</p>\
         <p>Thanks for signing up. Please confirm your email address by clicking the link below:</p>\
         <p><a href=\"{link}\">Verify email</a></p>\
         <p>This link expires in 24 hours.</p>"
    );
    (subject, body)
}

/// パスワードリセットメッセージ（件名, 本文）
pub fn password_reset_message(full_name: &str, link: &str) -> (String, String) {
    let subject = "Reset your password".to_string();
    let body = format!(
        "<p>Hello {full_name},</p>\
         <p>We received a request to reset your password. Click the link below to choose a new one:</p>\
         <p><a href=\"{link}\">Reset password</a></p>\
         <p>This link expires in 1 hour. If you did not request this, you can ignore this email.</p>"
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_service_without_smtp_does_not_deliver() {
        let config = Config::load_from(vec![
            (
                "DATABASE_URL".to_string(),
                "postgres://localhost/ledgerguard".to_string(),
            ),
            ("JWT_SECRET".to_string(), "secret".to_string()),
        ])
        .unwrap();
        assert!(!EmailService::new(Arc::new(config)).delivers_mail());
    }

    #[test]
    fn test_messages_embed_link() {
        let (subject, body) = verification_message("Alice", "http://x/verify?token=abc");
        assert_eq!(subject, "Verify your email address");
        assert!(body.contains("http://x/verify?token=abc"));
        assert!(body.contains("Alice"));

        let (subject, body) = password_reset_message("Bob", "http://x/reset?token=def");
        assert_eq!(subject, "Reset your password");
        assert!(body.contains("http://x/reset?token=def"));
    }

    #[tokio::test]
    async fn test_recording_notifier_extracts_token() {
        let notifier = RecordingNotifier::new();
        let (subject, body) = verification_message("Alice", "http://x/verify?token=abc-_9");
        notifier.send("alice@example.com", &subject, &body).await.unwrap();

        let message = notifier.last_to("alice@example.com").unwrap();
        assert_eq!(message.token().as_deref(), Some("abc-_9"));
        assert!(notifier.last_to("bob@example.com").is_none());
    }

    #[tokio::test]
    async fn test_failing_notifier_reports_notification_error() {
        let err = FailingNotifier.send("a@b.c", "s", "b").await.unwrap_err();
        assert!(matches!(err, AppError::Notification(_)));
    }
}
