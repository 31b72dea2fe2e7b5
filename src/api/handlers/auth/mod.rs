//! Student-portal auth surface: identity verification, registration,
//! login, session refresh, and admin unwind.

pub mod admin;
pub mod login;
pub mod registration;
pub mod state;
pub mod types;
mod utils;
pub mod verify;

pub use state::{AuthConfig, AuthState};
