//! Services composing the repositories into the auth-security flows
//!
//! - [`RateLimiter`]: fixed-window request limiting per client key
//! - [`LockoutService`]: failed-login streaks and timed locks
//! - [`TokenService`]: access/refresh token pairs and rotation
//! - [`AuthService`]: login, logout, refresh and password change
//! - [`AccountService`]: signup and profile lifecycle

pub mod account;
pub mod auth;
pub(crate) mod dependency;
pub mod lockout;
pub mod rate_limit;
pub mod token;

pub use account::{AccountService, DetailsUpdate, Signup};
pub use auth::{AuthService, Credentials, PasswordChange};
pub use lockout::{LockoutOutcome, LockoutService, LockoutState, LockoutStatus};
pub use rate_limit::{ClientKey, RateLimitDecision, RateLimiter, normalize_ip};
pub use token::{IssuedSession, TokenService};
