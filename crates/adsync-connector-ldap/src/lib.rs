//! # LDAP Directory Transport
//!
//! `ldap3`-backed implementation of the `DirectorySearch` contract for
//! LDAP and Active Directory servers.
//!
//! ## Features
//!
//! - LDAP v3 over plain, LDAPS, or STARTTLS connections
//! - Paged search results
//! - Protocol-level server controls (e.g. tombstone visibility)
//! - Update-sequence-number extraction for watermark tracking
//! - rootDSE probing for diagnostics (`highestCommittedUSN`)
//!
//! ## Example
//!
//! ```ignore
//! use adsync_connector::DirectorySearch;
//! use adsync_connector_ldap::{LdapConfig, LdapDirectory};
//!
//! let config = LdapConfig::new(
//!     "dc01.example.com",
//!     "dc=example,dc=com",
//!     "cn=poller,cn=Users,dc=example,dc=com",
//! )
//! .with_password("secret")
//! .with_ssl();
//!
//! let directory = LdapDirectory::new(config)?;
//! directory.test_connection().await?;
//! ```

pub mod config;
pub mod directory;

// Re-exports
pub use config::LdapConfig;
pub use directory::{DirectoryServerInfo, LdapDirectory};
