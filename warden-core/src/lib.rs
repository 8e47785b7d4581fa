//! Core functionality for the warden authentication-security ecosystem
//!
//! This crate holds the domain types, the storage traits and the services
//! that guard an account system against credential stuffing and request
//! floods: a fixed-window [`RateLimiter`](services::RateLimiter), a login
//! [`LockoutService`](services::LockoutService), a
//! [`TokenService`](services::TokenService) issuing rotating access/refresh
//! pairs, and the [`AuthService`](services::AuthService) that orders them.
//!
//! Storage is abstracted behind [`repositories::RepositoryProvider`]. The
//! in-memory and on-disk backends in [`storage`] are enough for tests and
//! single-process deployments; durable and shared backends live in the
//! `warden-storage-*` crates.
pub mod account;
pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod repositories;
pub mod services;
pub mod session;
pub mod storage;
pub mod validation;

pub use account::{Account, AccountId, AccountProfile, Avatar, NewAccount, Role};
pub use config::{
    FailurePolicy, LockoutConfig, RateLimitConfig, StoreConfig, TokenConfig, WardenConfig,
};
pub use error::{Error, ErrorKind};
pub use session::{AccessClaims, JwtConfig, RefreshClaims, TokenPair};
