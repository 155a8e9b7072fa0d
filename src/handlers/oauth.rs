//! Google ソーシャルログインハンドラー
//!
//! # Security
//! - state は AES-256-GCM で暗号化され、発行時刻で有効期限を判定する
//! - プロバイダーの access_token はログに出力しない
//! - 照合キーはプロバイダーが返すメールアドレス

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::services::{GoogleOAuthService, SessionTokens};
use crate::state::AppState;

/// OAuth コールバック時のクエリパラメータ
///
/// 利用者が同意を拒否した場合は code の代わりに error が届く。
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn google_service(state: &AppState) -> Result<&GoogleOAuthService, AppError> {
    state.google_oauth.as_ref().ok_or_else(|| {
        tracing::warn!("Google OAuth が設定されていません");
        AppError::OAuthError("Google OAuth is not configured".to_string())
    })
}

/// Google OAuth 認証開始
///
/// GET /api/oauth2/google
///
/// Google の認可画面へリダイレクトする。
pub async fn google_auth(State(state): State<AppState>) -> Result<Redirect, AppError> {
    tracing::info!("Google OAuth 認証開始");

    let auth_url = google_service(&state)?.generate_auth_url()?;

    tracing::debug!("Google OAuth 認可 URL 生成成功");
    Ok(Redirect::to(&auth_url))
}

/// Google OAuth コールバック処理
///
/// GET /api/oauth2/google/callback
///
/// # 処理フロー
/// 1. state を復号して有効期限を確認
/// 2. code をアクセストークンに交換
/// 3. 本人情報を取得
/// 4. メールアドレスでユーザーを照合（無ければ作成）
/// 5. セッショントークンを付けてフロントエンドへリダイレクト
///
/// 失敗時も JSON ではなく `error` パラメータ付きでフロントエンドへ戻す。
pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Redirect {
    tracing::info!("Google OAuth コールバック受信");

    let target = &state.config.oauth_success_redirect_uri;
    match complete_google_login(&state, query).await {
        Ok(tokens) => Redirect::to(&append_query(
            target,
            &[
                ("token", &tokens.access_token),
                ("refreshToken", &tokens.refresh_token),
            ],
        )),
        Err(e) => {
            tracing::warn!(error = %e, kind = e.kind(), "Google OAuth ログイン失敗");
            Redirect::to(&append_query(target, &[("error", &e.to_string())]))
        }
    }
}

async fn complete_google_login(
    state: &AppState,
    query: OAuthCallbackQuery,
) -> Result<SessionTokens, AppError> {
    let oauth_service = google_service(state)?;

    if let Some(error) = query.error {
        return Err(AppError::OAuthError(format!("provider returned error: {error}")));
    }
    let (code, oauth_state) = query
        .code
        .zip(query.state)
        .ok_or_else(|| AppError::OAuthError("missing code or state".to_string()))?;

    // 1. state 検証
    oauth_service.verify_state(&oauth_state)?;

    // 2. code でトークン交換
    let access_token = oauth_service.exchange_code(&code).await?;
    tracing::debug!("トークン交換成功");

    // 3. 本人情報取得
    let assertion = oauth_service.get_user_info(&access_token).await?;
    tracing::info!(provider = assertion.provider.as_str(), "OAuth ユーザー情報取得成功");

    // 4. ユーザー照合
    let reconciled = state.reconciler.reconcile(&assertion).await?;
    tracing::info!(
        user_id = %reconciled.user.id,
        outcome = ?reconciled.outcome,
        "ソーシャルログイン成功"
    );

    // 5. セッション発行
    state.sessions.issue(&reconciled.user.username)
}

/// 既存のクエリを保ったままパラメータを追加
fn append_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}
