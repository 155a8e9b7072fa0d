use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::repositories::{
    BudgetRepository, BudgetStore, MemoryStore, PasswordResetTokenRepository,
    PasswordResetTokenStore, TransactionRepository, TransactionStore, UserRepository, UserStore,
    VerificationTokenRepository, VerificationTokenStore,
};
use crate::services::{
    AuthService, BudgetService, EmailVerificationService, GoogleOAuthService, IdentityReconciler,
    Notifier, PasswordResetService, ReportService, SessionIssuer, TokenPolicy, TransactionService,
};

/// ストア実装の組
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub verification_tokens: Arc<dyn VerificationTokenStore>,
    pub reset_tokens: Arc<dyn PasswordResetTokenStore>,
    pub budgets: Arc<dyn BudgetStore>,
    pub transactions: Arc<dyn TransactionStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            verification_tokens: Arc::new(VerificationTokenRepository::new(pool.clone())),
            reset_tokens: Arc::new(PasswordResetTokenRepository::new(pool.clone())),
            budgets: Arc::new(BudgetRepository::new(pool.clone())),
            transactions: Arc::new(TransactionRepository::new(pool)),
        }
    }

    pub fn memory(store: &MemoryStore) -> Self {
        Self {
            users: Arc::new(store.clone()),
            verification_tokens: Arc::new(store.clone()),
            reset_tokens: Arc::new(store.clone()),
            budgets: Arc::new(store.clone()),
            transactions: Arc::new(store.clone()),
        }
    }
}

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    pub auth: AuthService,
    pub verification: EmailVerificationService,
    pub password_reset: PasswordResetService,
    pub sessions: SessionIssuer,
    pub reconciler: IdentityReconciler,
    pub budgets: BudgetService,
    pub transactions: TransactionService,
    pub reports: ReportService,
    /// Google OAuth サービス（設定されている場合のみ）
    pub google_oauth: Option<GoogleOAuthService>,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> Result<Self, AppError> {
        let policy = TokenPolicy::from_config(&config);
        let sessions = SessionIssuer::from_config(&config);

        let verification = EmailVerificationService::new(
            stores.users.clone(),
            stores.verification_tokens.clone(),
            notifier.clone(),
            policy.clone(),
        );
        let password_reset = PasswordResetService::new(
            stores.users.clone(),
            stores.reset_tokens.clone(),
            notifier,
            policy,
        );
        let auth = AuthService::new(stores.users.clone(), verification.clone(), sessions.clone());
        let reconciler = IdentityReconciler::new(stores.users.clone());
        let budgets = BudgetService::new(stores.budgets.clone(), stores.transactions.clone());
        let transactions = TransactionService::new(stores.transactions.clone(), budgets.clone());
        let reports = ReportService::new(stores.transactions);

        // Google OAuth サービス（設定されている場合のみ初期化）
        let google_oauth = match (
            &config.google_client_id,
            &config.google_client_secret,
            &config.google_redirect_uri,
            &config.oauth_state_secret,
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri), Some(state_secret)) => {
                tracing::info!("Google OAuth サービスを初期化");
                Some(GoogleOAuthService::new(
                    client_id.clone(),
                    client_secret.expose_secret().clone(),
                    redirect_uri.clone(),
                    state_secret.expose_secret(),
                )?)
            }
            _ => {
                tracing::info!("Google OAuth 未設定（スキップ）");
                None
            }
        };

        Ok(Self {
            config,
            auth,
            verification,
            password_reset,
            sessions,
            reconciler,
            budgets,
            transactions,
            reports,
            google_oauth,
        })
    }

    /// インメモリストアで AppState を作成（テスト用）
    pub fn in_memory(
        store: &MemoryStore,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Result<Self, AppError> {
        Self::new(Stores::memory(store), notifier, Arc::new(config))
    }
}
