//! `deskhive-auth`: pure authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: callers load
//! membership and custom-role rows, this crate turns them into decisions.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{AuthzError, Principal, authorize, ensure_grantable};
pub use claims::{SessionClaims, TokenError, validate_claims};
pub use password::{BcryptHasher, PasswordError, PasswordHasher, generate_password};
pub use permissions::{Capabilities, Capability, derive_capabilities};
pub use principal::{OrgMembership, RoleType};
pub use roles::{BUILTIN_ROLE_NAMES, BuiltinRole, CustomRole, normalize_role_name};
pub use token::{Hs256SessionCodec, SessionCodec};
