pub mod budget;
pub mod money;
pub mod password_reset_token;
pub mod transaction;
pub mod user;
pub mod verification_token;

pub use budget::Budget;
pub use password_reset_token::PasswordResetToken;
pub use transaction::{Transaction, TransactionType};
pub use user::{AuthProvider, User};
pub use verification_token::VerificationToken;
