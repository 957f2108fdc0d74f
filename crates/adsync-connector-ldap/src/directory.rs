//! LDAP directory implementation of the `DirectorySearch` contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::controls::RawControl;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use adsync_connector::entry::{AttributeSet, AttributeValue, DirectoryEntry, SearchControl};
use adsync_connector::error::{ConnectorError, ConnectorResult};
use adsync_connector::traits::DirectorySearch;

use crate::config::LdapConfig;

/// Information retrieved from the server's rootDSE.
#[derive(Debug, Clone, Default)]
pub struct DirectoryServerInfo {
    /// DNS hostname of the domain controller.
    pub dns_host_name: Option<String>,
    /// Default naming context (base DN).
    pub default_naming_context: Option<String>,
    /// Highest committed update sequence number.
    pub highest_committed_usn: Option<String>,
}

/// LDAP/Active Directory transport.
pub struct LdapDirectory {
    config: LdapConfig,

    /// Cached LDAP connection handle (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapDirectory {
    /// Create a new LDAP directory transport with the given configuration.
    pub fn new(config: LdapConfig) -> ConnectorResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// The transport configuration.
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Get an LDAP handle, creating the connection if necessary.
    async fn get_connection(&self) -> ConnectorResult<Ldap> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let conn = self.create_connection().await?;

        {
            let mut conn_guard = self.connection.write().await;
            *conn_guard = Some(conn.clone());
        }

        Ok(conn)
    }

    /// Establish and bind a new connection.
    async fn create_connection(&self) -> ConnectorResult<Ldap> {
        let url = self.config.url();

        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(
                self.config.connection.connection_timeout_secs,
            ))
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                ConnectorError::connection_failed_with_source(
                    format!("failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        // Drive the connection in the background for the handle's lifetime.
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap.simple_bind(bind_dn, bind_password).await.map_err(|e| {
            ConnectorError::connection_failed_with_source(
                format!("LDAP bind failed for {bind_dn}"),
                e,
            )
        })?;

        if result.rc != 0 {
            // 49 = invalidCredentials
            if result.rc == 49 {
                return Err(ConnectorError::AuthenticationFailed);
            }
            return Err(ConnectorError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %self.config.host, "LDAP connection established");

        Ok(ldap)
    }

    /// Read server metadata from the rootDSE.
    #[instrument(skip(self), fields(host = %self.config.host))]
    pub async fn server_info(&self) -> ConnectorResult<DirectoryServerInfo> {
        let mut ldap = self.get_connection().await?;

        let (entries, _res) = ldap
            .search(
                "",
                Scope::Base,
                "(objectClass=*)",
                vec![
                    "dnsHostName",
                    "defaultNamingContext",
                    "highestCommittedUSN",
                ],
            )
            .await
            .map_err(|e| ConnectorError::search_failed_with_source("rootDSE query failed", e))?
            .success()
            .map_err(|e| ConnectorError::search_failed_with_source("rootDSE query rejected", e))?;

        let mut server_info = DirectoryServerInfo::default();
        if let Some(entry) = entries.into_iter().next() {
            let entry = SearchEntry::construct(entry);
            server_info.dns_host_name = single_value(&entry, "dnsHostName");
            server_info.default_naming_context = single_value(&entry, "defaultNamingContext");
            server_info.highest_committed_usn = single_value(&entry, "highestCommittedUSN");
        }

        Ok(server_info)
    }

    /// Run a search, choosing paged or single-operation mode.
    ///
    /// `RawControl`s attach to exactly one protocol operation, while the
    /// paging adapter reissues the search once per page. Explicit
    /// controls therefore force a single unpaged operation so none of
    /// the pages run uncontrolled.
    async fn search_entries(
        &self,
        filter: &str,
        attributes: &[String],
        controls: &[SearchControl],
    ) -> ConnectorResult<Vec<SearchEntry>> {
        let mut ldap = self.get_connection().await?;
        ldap.with_timeout(Duration::from_secs(
            self.config.connection.operation_timeout_secs,
        ));

        let attrs: Vec<&str> = attributes.iter().map(String::as_str).collect();
        let base = self.config.base_dn.clone();

        if controls.is_empty() && self.config.page_size > 0 {
            let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
                Box::new(EntriesOnly::new()),
                Box::new(PagedResults::new(self.config.page_size as i32)),
            ];

            let mut stream = ldap
                .streaming_search_with(adapters, &base, Scope::Subtree, filter, attrs)
                .await
                .map_err(|e| ConnectorError::search_failed_with_source("paged search failed", e))?;

            let mut entries = Vec::new();
            while let Some(entry) = stream
                .next()
                .await
                .map_err(|e| ConnectorError::search_failed_with_source("paged search failed", e))?
            {
                entries.push(SearchEntry::construct(entry));
            }

            stream
                .finish()
                .await
                .success()
                .map_err(|e| ConnectorError::search_failed_with_source("paged search rejected", e))?;

            return Ok(entries);
        }

        if !controls.is_empty() {
            let raw: Vec<RawControl> = controls.iter().map(to_raw_control).collect();
            ldap.with_controls(raw);
        }

        let (entries, _res) = ldap
            .search(&base, Scope::Subtree, filter, attrs)
            .await
            .map_err(|e| ConnectorError::search_failed_with_source("search failed", e))?
            .success()
            .map_err(|e| ConnectorError::search_failed_with_source("search rejected", e))?;

        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }
}

#[async_trait]
impl DirectorySearch for LdapDirectory {
    #[instrument(skip(self, attributes, controls), fields(host = %self.config.host, filter = %filter))]
    async fn search(
        &self,
        filter: &str,
        attributes: &[String],
        controls: &[SearchControl],
    ) -> ConnectorResult<Vec<DirectoryEntry>> {
        let raw_entries = self.search_entries(filter, attributes, controls).await?;

        debug!(entry_count = raw_entries.len(), "LDAP search completed");

        Ok(raw_entries
            .into_iter()
            .map(|entry| {
                convert_entry(
                    entry,
                    &self.config.change_marker_attribute,
                    &self.config.created_marker_attribute,
                )
            })
            .collect())
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        self.server_info().await.map(|_| ())
    }
}

/// Convert a configured `SearchControl` to the wire representation.
fn to_raw_control(control: &SearchControl) -> RawControl {
    RawControl {
        ctype: control.oid.clone(),
        crit: control.critical,
        val: control.value.as_ref().map(|v| v.as_bytes().to_vec()),
    }
}

fn single_value(entry: &SearchEntry, attribute: &str) -> Option<String> {
    entry
        .attrs
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
        .and_then(|(_, values)| values.first())
        .cloned()
}

/// Convert an `ldap3` search entry into the connector entry model.
///
/// String attributes become `String`/`Array` values in server order;
/// binary attributes are surfaced base64-encoded so objectGUID-style
/// values stay JSON-clean. The configured marker attributes are parsed
/// into change/creation markers, and an `isDeleted` of TRUE marks a
/// tombstone.
pub fn convert_entry(
    entry: SearchEntry,
    change_marker_attribute: &str,
    created_marker_attribute: &str,
) -> DirectoryEntry {
    let mut attributes = AttributeSet::new();
    let mut change_marker = None;
    let mut created_marker = None;
    let mut is_deleted = false;

    for (name, values) in &entry.attrs {
        if name.eq_ignore_ascii_case(change_marker_attribute) {
            change_marker = values.first().and_then(|v| v.parse().ok());
        } else if name.eq_ignore_ascii_case(created_marker_attribute) {
            created_marker = values.first().and_then(|v| v.parse().ok());
        } else if name.eq_ignore_ascii_case("isDeleted") {
            is_deleted = values
                .first()
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
        }

        let value = match values.len() {
            0 => continue,
            1 => AttributeValue::String(values[0].clone()),
            _ => AttributeValue::Array(
                values
                    .iter()
                    .map(|v| AttributeValue::String(v.clone()))
                    .collect(),
            ),
        };
        attributes.set(name.clone(), value);
    }

    let b64 = base64::engine::general_purpose::STANDARD;
    for (name, values) in &entry.bin_attrs {
        let value = match values.len() {
            0 => continue,
            1 => AttributeValue::String(b64.encode(&values[0])),
            _ => AttributeValue::Array(
                values
                    .iter()
                    .map(|v| AttributeValue::String(b64.encode(v)))
                    .collect(),
            ),
        };
        attributes.set(name.clone(), value);
    }

    DirectoryEntry {
        dn: entry.dn,
        attributes,
        change_marker,
        created_marker,
        is_deleted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_entry() -> SearchEntry {
        let mut attrs: HashMap<String, Vec<String>> = HashMap::new();
        attrs.insert(
            "distinguishedName".to_string(),
            vec!["CN=John Doe,OU=Users,DC=example,DC=com".to_string()],
        );
        attrs.insert("sAMAccountName".to_string(), vec!["john.doe".to_string()]);
        attrs.insert(
            "memberOf".to_string(),
            vec![
                "CN=Developers,OU=Groups,DC=example,DC=com".to_string(),
                "CN=AllStaff,OU=Groups,DC=example,DC=com".to_string(),
            ],
        );
        attrs.insert("uSNChanged".to_string(), vec!["123456".to_string()]);
        attrs.insert("uSNCreated".to_string(), vec!["100000".to_string()]);

        let mut bin_attrs: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        bin_attrs.insert("objectGUID".to_string(), vec![vec![0x01; 16]]);

        SearchEntry {
            dn: "CN=John Doe,OU=Users,DC=example,DC=com".to_string(),
            attrs,
            bin_attrs,
        }
    }

    #[test]
    fn test_convert_entry_markers() {
        let entry = convert_entry(sample_entry(), "uSNChanged", "uSNCreated");

        assert_eq!(entry.change_marker.map(|m| m.value()), Some(123_456));
        assert_eq!(entry.created_marker.map(|m| m.value()), Some(100_000));
        assert!(!entry.is_deleted);
    }

    #[test]
    fn test_convert_entry_attributes() {
        let entry = convert_entry(sample_entry(), "uSNChanged", "uSNCreated");

        assert_eq!(entry.dn, "CN=John Doe,OU=Users,DC=example,DC=com");
        assert_eq!(entry.attributes.get_string("sAMAccountName"), Some("john.doe"));
        assert_eq!(
            entry.attributes.get_strings("memberOf").unwrap(),
            vec![
                "CN=Developers,OU=Groups,DC=example,DC=com",
                "CN=AllStaff,OU=Groups,DC=example,DC=com"
            ]
        );
        // Marker attributes stay visible in the projection.
        assert_eq!(entry.attributes.get_string("uSNChanged"), Some("123456"));
    }

    #[test]
    fn test_convert_entry_binary_base64() {
        let entry = convert_entry(sample_entry(), "uSNChanged", "uSNCreated");

        let expected = base64::engine::general_purpose::STANDARD.encode([0x01; 16]);
        assert_eq!(
            entry.attributes.get_string("objectGUID"),
            Some(expected.as_str())
        );
    }

    #[test]
    fn test_convert_entry_tombstone() {
        let mut raw = sample_entry();
        raw.attrs
            .insert("isDeleted".to_string(), vec!["TRUE".to_string()]);

        let entry = convert_entry(raw, "uSNChanged", "uSNCreated");
        assert!(entry.is_deleted);
    }

    #[test]
    fn test_convert_entry_marker_attribute_case_insensitive() {
        let mut raw = sample_entry();
        let values = raw.attrs.remove("uSNChanged").unwrap();
        raw.attrs.insert("usnchanged".to_string(), values);

        let entry = convert_entry(raw, "uSNChanged", "uSNCreated");
        assert_eq!(entry.change_marker.map(|m| m.value()), Some(123_456));
    }

    #[test]
    fn test_convert_entry_unparseable_marker_ignored() {
        let mut raw = sample_entry();
        raw.attrs
            .insert("uSNChanged".to_string(), vec!["garbage".to_string()]);

        let entry = convert_entry(raw, "uSNChanged", "uSNCreated");
        assert!(entry.change_marker.is_none());
    }

    #[test]
    fn test_to_raw_control() {
        let control = SearchControl::new("1.2.840.113556.1.4.417").critical();
        let raw = to_raw_control(&control);

        assert_eq!(raw.ctype, "1.2.840.113556.1.4.417");
        assert!(raw.crit);
        assert!(raw.val.is_none());

        let with_val = SearchControl::new("1.2.3").with_value("abc");
        let raw = to_raw_control(&with_val);
        assert_eq!(raw.val.as_deref(), Some("abc".as_bytes()));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = LdapConfig::new("", "dc=example,dc=com", "cn=admin");
        assert!(LdapDirectory::new(config).is_err());
    }
}
