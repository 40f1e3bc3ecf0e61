//! Outbound notices (role changes, credentials).
//!
//! Delivery is fire-and-forget: a notice is handed to a spawned task and a
//! failure is logged, never surfaced to the request that triggered it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Clone, PartialEq, Eq)]
pub enum Notice {
    /// A membership's role was assigned or changed.
    RoleChanged {
        to: String,
        org_name: String,
        role_label: String,
    },
    /// An account was created on someone's behalf.
    Credentials {
        to: String,
        org_name: String,
        password: String,
    },
}

impl Notice {
    pub fn recipient(&self) -> &str {
        match self {
            Notice::RoleChanged { to, .. } | Notice::Credentials { to, .. } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notice::RoleChanged { .. } => "role_changed",
            Notice::Credentials { .. } => "credentials",
        }
    }
}

impl fmt::Debug for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RoleChanged { to, org_name, role_label } => f
                .debug_struct("RoleChanged")
                .field("to", to)
                .field("org_name", org_name)
                .field("role_label", role_label)
                .finish(),
            Notice::Credentials { to, org_name, .. } => f
                .debug_struct("Credentials")
                .field("to", to)
                .field("org_name", org_name)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: Notice) -> Result<(), NotifyError>;
}

/// Writes notices to the log. Mail delivery is not wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notice: Notice) -> Result<(), NotifyError> {
        match &notice {
            Notice::RoleChanged { to, org_name, role_label } => {
                tracing::info!(to = %to, org = %org_name, role = %role_label, "role change notice");
            }
            Notice::Credentials { to, org_name, .. } => {
                tracing::info!(to = %to, org = %org_name, "credentials notice");
            }
        }
        Ok(())
    }
}

/// Send `notice` on a background task.
pub fn dispatch(notifier: Arc<dyn Notifier>, notice: Notice) {
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(h) => h,
        Err(_) => {
            tracing::warn!(kind = notice.kind(), "no runtime available; notice dropped");
            return;
        }
    };

    handle.spawn(async move {
        let kind = notice.kind();
        let to = notice.recipient().to_string();
        if let Err(e) = notifier.send(notice).await {
            tracing::warn!(error = %e, kind, to = %to, "notice delivery failed");
        }
    });
}
