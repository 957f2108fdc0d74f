//! LDAP transport configuration.

use serde::{Deserialize, Serialize};

use adsync_connector::config::ConnectionSettings;
use adsync_connector::error::{ConnectorError, ConnectorResult};

/// Configuration for an LDAP/Active Directory connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on a plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Base DN all searches are rooted at (e.g. "dc=example,dc=com").
    pub base_dn: String,

    /// Bind DN for authentication.
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Connection settings (timeouts).
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Page size for search operations. Zero disables paging.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Attribute carrying the entry's update sequence number.
    #[serde(default = "default_change_marker_attribute")]
    pub change_marker_attribute: String,

    /// Attribute carrying the entry's creation sequence number.
    #[serde(default = "default_created_marker_attribute")]
    pub created_marker_attribute: String,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("connection", &self.connection)
            .field("page_size", &self.page_size)
            .field("change_marker_attribute", &self.change_marker_attribute)
            .field("created_marker_attribute", &self.created_marker_attribute)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_page_size() -> u32 {
    1000
}

fn default_change_marker_attribute() -> String {
    "uSNChanged".to_string()
}

fn default_created_marker_attribute() -> String {
    "uSNCreated".to_string()
}

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            connection: ConnectionSettings::default(),
            page_size: default_page_size(),
            change_marker_attribute: default_change_marker_attribute(),
            created_marker_attribute: default_created_marker_attribute(),
        }
    }

    /// Set the bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS) and switch to the LDAPS port.
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Set the search page size (zero disables paging).
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Server URL for the configured scheme.
    pub fn url(&self) -> String {
        if self.use_ssl {
            format!("ldaps://{}:{}", self.host, self.port)
        } else {
            format!("ldap://{}:{}", self.host, self.port)
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.host.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "host must not be empty".to_string(),
            });
        }
        if self.base_dn.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "base_dn must not be empty".to_string(),
            });
        }
        if self.bind_dn.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "bind_dn must not be empty".to_string(),
            });
        }
        if self.use_ssl && self.use_starttls {
            return Err(ConnectorError::InvalidConfiguration {
                message: "use_ssl and use_starttls are mutually exclusive".to_string(),
            });
        }
        Ok(())
    }
}
