//! The organization-hierarchy authorization engine.
//!
//! ## Request flow
//!
//! ```text
//! bearer token
//!   ↓
//! 1. SessionCodec::verify          (signature + time window → Unauthenticated)
//!   ↓
//! 2. re-read membership            (user × token org → Forbidden if gone)
//!   ↓
//! 3. derive capabilities           (custom role wins, dangling → view only)
//!   ↓
//! 4. scope check on target org     (subtree if the principal reaches it)
//!   ↓
//! 5. capability check              (→ Forbidden)
//!   ↓
//! 6. store write / read
//! ```
//!
//! Nothing is cached: every step re-reads the store on every request.

use std::sync::{Arc, OnceLock};

use chrono::Duration;

use deskhive_auth::{PasswordHasher, SessionCodec, generate_password};

use crate::config::DEFAULT_TOKEN_TTL_HOURS;
use crate::error::{AccessError, AccessResult};
use crate::notify::{self, LogNotifier, Notice, Notifier};
use crate::store::DirectoryStore;

pub mod directory;
pub mod hierarchy;
pub mod principals;
pub mod roles;
pub mod scope;
pub mod sessions;

pub use directory::{AssignMember, CreateMember, CreateSubOrg, MemberView, OrgChildren, RemoveMember, UpdateMemberRole};
pub use roles::{RoleCatalog, UpsertRole};
pub use sessions::{LoginOutcome, LoginRequest, MembershipSummary, SessionGrant, SignupRequest};

/// Shared entry point for every access-controlled operation.
///
/// Cheap to clone; all collaborators are behind `Arc`.
#[derive(Clone)]
pub struct AccessEngine {
    store: Arc<dyn DirectoryStore>,
    codec: Arc<dyn SessionCodec>,
    hasher: Arc<dyn PasswordHasher>,
    notifier: Arc<dyn Notifier>,
    token_ttl: Duration,
    /// Digest checked against when a login names an unknown email.
    decoy_digest: Arc<OnceLock<String>>,
}

impl AccessEngine {
    pub fn new(store: Arc<dyn DirectoryStore>, codec: Arc<dyn SessionCodec>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            store,
            codec,
            hasher,
            notifier: Arc::new(LogNotifier),
            token_ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            decoy_digest: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn store(&self) -> &dyn DirectoryStore {
        self.store.as_ref()
    }

    fn notify(&self, notice: Notice) {
        notify::dispatch(self.notifier.clone(), notice);
    }

    /// bcrypt is CPU-bound; keep it off the async workers.
    async fn hash_password(&self, plain: String) -> AccessResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| AccessError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(AccessError::from)
    }

    async fn verify_password(&self, plain: String, digest: String) -> AccessResult<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plain, &digest))
            .await
            .map_err(|e| AccessError::Internal(format!("password verification task failed: {e}")))
    }

    /// Spend one verification on a throwaway digest at the configured cost,
    /// so an unknown email takes as long as a wrong password.
    async fn verify_against_decoy(&self, plain: String) -> AccessResult<()> {
        let digest = match self.decoy_digest.get() {
            Some(digest) => digest.clone(),
            None => {
                let fresh = self.hash_password(generate_password(24)).await?;
                self.decoy_digest.get_or_init(|| fresh).clone()
            }
        };
        self.verify_password(plain, digest).await?;
        Ok(())
    }
}
