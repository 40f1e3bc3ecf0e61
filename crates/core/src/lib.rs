//! `deskhive-core`: tenant directory building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod org;

pub use error::{DomainError, DomainResult};
pub use id::{CustomRoleId, OrgId, UserId};
pub use org::{normalize_email, OrgProfile, OrgType, Organization, User};
