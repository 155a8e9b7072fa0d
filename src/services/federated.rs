//! 外部IdP（ソーシャルログイン）の本人情報をローカルユーザーに反映する

use std::sync::Arc;

use crate::error::AppError;
use crate::models::user::{FULL_NAME_MAX_CHARS, USERNAME_MAX_CHARS, truncate_chars};
use crate::models::{AuthProvider, User};
use crate::repositories::{StoreError, UserStore};

/// 一意制約の競合に負けたときの再試行回数
const MAX_RECONCILE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityProvider {
    Google,
}

impl IdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }

    fn default_display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google User",
        }
    }
}

/// IdP から受け取った本人情報（属性はすべて任意）
#[derive(Debug, Clone)]
pub struct IdentityAssertion {
    pub provider: IdentityProvider,
    pub subject: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub user: User,
    pub outcome: ReconcileOutcome,
}

#[derive(Clone)]
pub struct IdentityReconciler {
    users: Arc<dyn UserStore>,
}

impl IdentityReconciler {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// 本人情報をメールアドレスで既存ユーザーに照合し、無ければ作成
    ///
    /// 同じメールの初回ログインが同時に来た場合は一意制約が最終判定となり、
    /// 競合に負けた側は照合からやり直す。
    pub async fn reconcile(&self, assertion: &IdentityAssertion) -> Result<Reconciled, AppError> {
        let email = assertion
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| AppError::InvalidAssertion("email is missing".to_string()))?;

        for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
            let result = match self.users.find_by_email(email).await? {
                Some(existing) => self.update_existing(existing, assertion).await,
                None => self.create(email, assertion).await,
            };

            match result {
                Ok(reconciled) => return Ok(reconciled),
                Err(StoreError::Conflict(constraint)) => {
                    tracing::warn!(
                        attempt,
                        constraint = %constraint,
                        provider = assertion.provider.as_str(),
                        "ソーシャルログインのユーザー作成が競合（再試行）"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            provider = assertion.provider.as_str(),
            "ソーシャルログインのユーザー作成が再試行上限に到達"
        );
        Err(AppError::Conflict(
            "Could not allocate a unique account, please retry".to_string(),
        ))
    }

    async fn update_existing(
        &self,
        mut user: User,
        assertion: &IdentityAssertion,
    ) -> Result<Reconciled, StoreError> {
        let mut changed = false;

        if let Some(name) = non_empty(&assertion.name).map(display_name)
            && user.full_name != name
        {
            user.full_name = name.to_string();
            changed = true;
        }

        if let Some(avatar_url) = non_empty(&assertion.avatar_url)
            && user.avatar_url.as_deref() != Some(avatar_url)
        {
            user.avatar_url = Some(avatar_url.to_string());
            changed = true;
        }

        if !user.enabled {
            // IdP がメールアドレスの所有を確認済みのため、メール認証の代わりとする
            user.enabled = true;
            changed = true;
        }

        if user.auth_provider == AuthProvider::Local {
            // TODO: ローカルアカウントへの自動紐付けを許可するか（確認フローの追加）を再検討
            tracing::warn!(
                user_id = %user.id,
                provider = assertion.provider.as_str(),
                "ローカルアカウントにソーシャルログインを紐付け"
            );
        }

        if !changed {
            return Ok(Reconciled {
                user,
                outcome: ReconcileOutcome::Unchanged,
            });
        }

        let user = self.users.save(&user).await?;
        tracing::info!(user_id = %user.id, "ソーシャルログインでユーザー情報を更新");
        Ok(Reconciled {
            user,
            outcome: ReconcileOutcome::Updated,
        })
    }

    async fn create(
        &self,
        email: &str,
        assertion: &IdentityAssertion,
    ) -> Result<Reconciled, StoreError> {
        let username = self.generate_username(email).await?;
        let full_name = display_name(
            non_empty(&assertion.name).unwrap_or(assertion.provider.default_display_name()),
        )
        .to_string();

        let user = User::new_federated(
            username,
            email,
            full_name,
            non_empty(&assertion.avatar_url).map(str::to_string),
        );
        let user = self.users.save(&user).await?;

        tracing::info!(
            user_id = %user.id,
            username = %user.username,
            provider = assertion.provider.as_str(),
            "ソーシャルログインでユーザー作成"
        );
        Ok(Reconciled {
            user,
            outcome: ReconcileOutcome::Created,
        })
    }

    /// メールのローカル部から未使用のユーザー名を探す（base, base1, base2, ...）
    ///
    /// 連番を付けても列長に収まるよう、base 側を切り詰める。
    async fn generate_username(&self, email: &str) -> Result<String, StoreError> {
        let base = match email.split('@').next().map(str::trim) {
            Some(local) if !local.is_empty() => local,
            _ => "user",
        };

        let first = truncate_chars(base, USERNAME_MAX_CHARS);
        if !self.users.exists_by_username(first).await? {
            return Ok(first.to_string());
        }

        let mut suffix: u64 = 1;
        loop {
            let suffix_text = suffix.to_string();
            let stem = truncate_chars(base, USERNAME_MAX_CHARS - suffix_text.len());
            let candidate = format!("{stem}{suffix_text}");
            if !self.users.exists_by_username(&candidate).await? {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}

fn display_name(name: &str) -> &str {
    truncate_chars(name, FULL_NAME_MAX_CHARS).trim_end()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
