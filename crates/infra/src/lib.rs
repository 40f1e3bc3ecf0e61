//! Infrastructure layer: directory storage, the access engine, config, notices.

pub mod access;
pub mod config;
pub mod error;
pub mod notify;
pub mod store;

mod integration_tests;

pub use access::AccessEngine;
pub use config::{AppConfig, ConfigError};
pub use error::{AccessError, AccessResult};
pub use notify::{LogNotifier, Notice, Notifier, NotifyError};
pub use store::{DirectoryStore, InMemoryDirectoryStore, Member, PostgresDirectoryStore, StoreError};
