pub mod auth;
pub mod budget;
pub mod email;
pub mod federated;
pub mod oauth;
pub mod password_reset;
pub mod report;
pub mod session;
pub mod token;
pub mod transaction;
pub mod verification;

pub use auth::{AuthService, NewUser};
pub use budget::{BudgetService, NewBudget};
pub use email::{EmailService, FailingNotifier, Notifier, RecordingNotifier};
pub use federated::{IdentityAssertion, IdentityProvider, IdentityReconciler, ReconcileOutcome};
pub use oauth::GoogleOAuthService;
pub use password_reset::PasswordResetService;
pub use report::{PeriodReport, ReportService};
pub use session::{SessionIssuer, SessionSettings, SessionTokens};
pub use token::TokenPolicy;
pub use transaction::{NewTransaction, TransactionService};
pub use verification::EmailVerificationService;
