//! Asset data model.
//!
//! An [`Asset`] is a common envelope (id, name, timestamps, tags,
//! credentials) around an [`AssetDetails`] value that carries only the
//! attributes of its own type. The type discriminator travels as the
//! `asset_type` field on the wire, so a cloud asset serializes as
//!
//! ```json
//! {"id": 1, "name": "web-1", "asset_type": "cloud", "region": "cn-hangzhou", ...}
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::credential::{Credential, CredentialInput};
use super::tag::Tag;
use crate::validation::{normalize_optional, ValidationErrors};
use crate::vault::is_unchanged_secret;

/// The fixed kind of an asset. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Server,
    Cloud,
    Database,
    Software,
    System,
    Hardware,
}

impl AssetType {
    pub const ALL: [AssetType; 6] = [
        AssetType::Server,
        AssetType::Cloud,
        AssetType::Database,
        AssetType::Software,
        AssetType::System,
        AssetType::Hardware,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Server => "server",
            AssetType::Cloud => "cloud",
            AssetType::Database => "database",
            AssetType::Software => "software",
            AssetType::System => "system",
            AssetType::Hardware => "hardware",
        }
    }

    /// Whether assets of this type carry an `expires_at` attribute.
    pub fn has_expiry(&self) -> bool {
        matches!(self, AssetType::Cloud)
    }

    /// Attributes offered as autocomplete suggestions for this type.
    pub fn suggestion_fields(&self) -> &'static [&'static str] {
        match self {
            AssetType::Server => &["os_name", "os_version", "platform", "cpu_architecture"],
            AssetType::Cloud => &["os_name", "os_version", "region", "zone", "instance_type"],
            AssetType::Database => &["db_type"],
            AssetType::Hardware => &["hardware_type", "brand"],
            AssetType::Software | AssetType::System => &[],
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = ValidationErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                ValidationErrors::single("asset_type", format!("unknown asset type '{}'", s))
            })
    }
}

fn default_ssh_port() -> i64 {
    22
}

/// An extra network interface of a server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkInterface {
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub purpose: Option<String>,
}

/// A named secondary port of a database (e.g. `HTTP:8123`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabasePort {
    pub name: String,
    pub port: i64,
}

/// How a software asset is licensed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum License {
    /// A license file previously uploaded through the file store.
    File { path: String },
    /// A license code. Secret: encrypted at rest, masked for non-admins.
    Code { code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerDetails {
    pub purpose: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub public_ipv4: Option<String>,
    pub private_ipv4: Option<String>,
    pub cpu_architecture: Option<String>,
    /// Linux, Windows, ...
    pub platform: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub ssh_port: i64,
    pub notes: Option<String>,
    pub network_interfaces: Vec<NetworkInterface>,
}

impl Default for ServerDetails {
    fn default() -> Self {
        Self {
            purpose: None,
            cpu: None,
            memory: None,
            public_ipv4: None,
            private_ipv4: None,
            cpu_architecture: None,
            platform: None,
            os_name: None,
            os_version: None,
            ssh_port: default_ssh_port(),
            notes: None,
            network_interfaces: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudDetails {
    pub cloud_account_id: Option<i64>,
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub public_ipv4: Option<String>,
    pub private_ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub instance_type: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub disk_space: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub bandwidth: Option<String>,
    pub bandwidth_billing_mode: Option<String>,
    pub ssh_port: i64,
    pub purchase_date: Option<NaiveDate>,
    pub expires_at: Option<DateTime<Utc>>,
    /// prepaid, postpaid
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl Default for CloudDetails {
    fn default() -> Self {
        Self {
            cloud_account_id: None,
            instance_id: None,
            instance_name: None,
            region: None,
            zone: None,
            public_ipv4: None,
            private_ipv4: None,
            ipv6: None,
            instance_type: None,
            cpu: None,
            memory: None,
            disk_space: None,
            os_name: None,
            os_version: None,
            bandwidth: None,
            bandwidth_billing_mode: None,
            ssh_port: default_ssh_port(),
            purchase_date: None,
            expires_at: None,
            payment_method: None,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseDetails {
    /// MySQL, PostgreSQL, MongoDB, ...
    pub db_type: Option<String>,
    pub host: Option<String>,
    /// Primary port.
    pub port: Option<i64>,
    pub ports: Vec<DatabasePort>,
    pub databases: Vec<String>,
    pub quota: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftwareDetails {
    pub software_name: Option<String>,
    pub login_url: Option<String>,
    pub login_account: Option<String>,
    pub phone: Option<String>,
    pub license: Option<License>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemDetails {
    pub ip_address: Option<String>,
    pub port: Option<i64>,
    pub default_account: Option<String>,
    /// Secret: encrypted at rest, masked for non-admins.
    pub default_password: Option<String>,
    pub login_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareDetails {
    /// PC, laptop, switch, router, phone, SIM card, ...
    pub hardware_type: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: Option<f64>,
    pub responsible_person: Option<String>,
    pub user: Option<String>,
    pub usage_area: Option<String>,
    pub notes: Option<String>,
}

/// Type-specific attributes, discriminated by `asset_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "asset_type", rename_all = "snake_case")]
pub enum AssetDetails {
    Server(ServerDetails),
    Cloud(CloudDetails),
    Database(DatabaseDetails),
    Software(SoftwareDetails),
    System(SystemDetails),
    Hardware(HardwareDetails),
}

impl AssetDetails {
    /// Empty attributes for a type.
    pub fn empty(asset_type: AssetType) -> Self {
        match asset_type {
            AssetType::Server => AssetDetails::Server(ServerDetails::default()),
            AssetType::Cloud => AssetDetails::Cloud(CloudDetails::default()),
            AssetType::Database => AssetDetails::Database(DatabaseDetails::default()),
            AssetType::Software => AssetDetails::Software(SoftwareDetails::default()),
            AssetType::System => AssetDetails::System(SystemDetails::default()),
            AssetType::Hardware => AssetDetails::Hardware(HardwareDetails::default()),
        }
    }

    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetDetails::Server(_) => AssetType::Server,
            AssetDetails::Cloud(_) => AssetType::Cloud,
            AssetDetails::Database(_) => AssetType::Database,
            AssetDetails::Software(_) => AssetType::Software,
            AssetDetails::System(_) => AssetType::System,
            AssetDetails::Hardware(_) => AssetType::Hardware,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AssetDetails::Cloud(c) => c.expires_at,
            _ => None,
        }
    }

    pub fn cloud_account_id(&self) -> Option<i64> {
        match self {
            AssetDetails::Cloud(c) => c.cloud_account_id,
            _ => None,
        }
    }

    /// Identifying attributes covered by free-text search.
    pub fn search_terms(&self) -> Vec<&str> {
        let fields: Vec<&Option<String>> = match self {
            AssetDetails::Server(s) => {
                let mut f = vec![&s.public_ipv4, &s.private_ipv4, &s.purpose, &s.os_name];
                f.extend(s.network_interfaces.iter().map(|n| &n.ip_address));
                f
            }
            AssetDetails::Cloud(c) => vec![
                &c.instance_id,
                &c.instance_name,
                &c.public_ipv4,
                &c.private_ipv4,
                &c.region,
            ],
            AssetDetails::Database(d) => {
                let mut terms: Vec<&str> = [&d.host, &d.db_type]
                    .into_iter()
                    .filter_map(|f| f.as_deref())
                    .collect();
                terms.extend(d.databases.iter().map(String::as_str));
                return terms;
            }
            AssetDetails::Software(s) => vec![&s.software_name, &s.login_url, &s.login_account],
            AssetDetails::System(s) => vec![&s.ip_address, &s.login_url, &s.default_account],
            AssetDetails::Hardware(h) => vec![
                &h.serial_number,
                &h.brand,
                &h.model,
                &h.user,
                &h.responsible_person,
            ],
        };
        fields.into_iter().filter_map(|f| f.as_deref()).collect()
    }

    /// Applies `f` to every present, non-blank secret attribute.
    pub fn map_secrets<E>(
        &mut self,
        mut f: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<(), E> {
        match self {
            AssetDetails::Software(SoftwareDetails {
                license: Some(License::Code { code }),
                ..
            }) if !is_unchanged_secret(code) => {
                *code = f(code)?;
            }
            AssetDetails::System(SystemDetails {
                default_password: Some(password),
                ..
            }) if !is_unchanged_secret(password) => {
                *password = f(password)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Keeps the previous value of every secret attribute left blank or
    /// sent back masked.
    ///
    /// A blank license code is replaced by the previous code; an absent or
    /// blank default password keeps the previous password.
    pub fn keep_blank_secrets(&mut self, previous: &AssetDetails) {
        match (self, previous) {
            (
                AssetDetails::Software(SoftwareDetails {
                    license: Some(License::Code { code }),
                    ..
                }),
                AssetDetails::Software(SoftwareDetails {
                    license: Some(License::Code { code: old }),
                    ..
                }),
            ) if is_unchanged_secret(code) => {
                *code = old.clone();
            }
            (AssetDetails::System(current), AssetDetails::System(old))
                if current
                    .default_password
                    .as_deref()
                    .map_or(true, is_unchanged_secret) =>
            {
                current.default_password = old.default_password.clone();
            }
            _ => {}
        }
    }

    /// Trims optional text, collapsing blank values to `None`.
    pub fn normalize(&mut self) {
        fn norm(v: &mut Option<String>) {
            *v = normalize_optional(v.take());
        }
        match self {
            AssetDetails::Server(s) => {
                for f in [
                    &mut s.purpose,
                    &mut s.cpu,
                    &mut s.memory,
                    &mut s.public_ipv4,
                    &mut s.private_ipv4,
                    &mut s.cpu_architecture,
                    &mut s.platform,
                    &mut s.os_name,
                    &mut s.os_version,
                ] {
                    norm(f);
                }
                for nic in &mut s.network_interfaces {
                    norm(&mut nic.ip_address);
                    norm(&mut nic.mac_address);
                    norm(&mut nic.purpose);
                }
            }
            AssetDetails::Cloud(c) => {
                for f in [
                    &mut c.instance_id,
                    &mut c.instance_name,
                    &mut c.region,
                    &mut c.zone,
                    &mut c.public_ipv4,
                    &mut c.private_ipv4,
                    &mut c.ipv6,
                    &mut c.instance_type,
                    &mut c.os_name,
                    &mut c.os_version,
                    &mut c.payment_method,
                ] {
                    norm(f);
                }
            }
            AssetDetails::Database(d) => {
                norm(&mut d.db_type);
                norm(&mut d.host);
                d.databases = d
                    .databases
                    .drain(..)
                    .map(|db| db.trim().to_string())
                    .filter(|db| !db.is_empty())
                    .collect();
            }
            AssetDetails::Software(s) => {
                norm(&mut s.software_name);
                norm(&mut s.login_url);
                norm(&mut s.login_account);
                if let Some(License::Code { code }) = &mut s.license {
                    if is_unchanged_secret(code) {
                        code.clear();
                    }
                }
            }
            AssetDetails::System(s) => {
                norm(&mut s.ip_address);
                norm(&mut s.login_url);
                norm(&mut s.default_account);
                if s.default_password.as_deref().map_or(false, is_unchanged_secret) {
                    s.default_password = None;
                }
            }
            AssetDetails::Hardware(h) => {
                for f in [
                    &mut h.hardware_type,
                    &mut h.brand,
                    &mut h.model,
                    &mut h.serial_number,
                ] {
                    norm(f);
                }
            }
        }
    }

    /// Checks required attributes, IPv4 addresses and port ranges.
    pub fn validate(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        match self {
            AssetDetails::Server(s) => {
                errors.check_ipv4("public_ipv4", s.public_ipv4.as_deref());
                errors.check_ipv4("private_ipv4", s.private_ipv4.as_deref());
                errors.check_port("ssh_port", Some(s.ssh_port));
                for (i, nic) in s.network_interfaces.iter().enumerate() {
                    errors.check_ipv4(
                        &format!("network_interfaces[{}].ip_address", i),
                        nic.ip_address.as_deref(),
                    );
                }
            }
            AssetDetails::Cloud(c) => {
                errors.check_ipv4("public_ipv4", c.public_ipv4.as_deref());
                errors.check_ipv4("private_ipv4", c.private_ipv4.as_deref());
                errors.check_port("ssh_port", Some(c.ssh_port));
            }
            AssetDetails::Database(d) => {
                errors.require("db_type", d.db_type.as_deref());
                errors.require("host", d.host.as_deref());
                match d.port {
                    Some(port) => errors.check_port("port", Some(port)),
                    None => errors.add("port", "port is required"),
                }
                for (i, p) in d.ports.iter().enumerate() {
                    if p.name.trim().is_empty() {
                        errors.add(format!("ports[{}].name", i), "port name is required");
                    }
                    errors.check_port(&format!("ports[{}].port", i), Some(p.port));
                }
            }
            AssetDetails::Software(s) => {
                errors.require("software_name", s.software_name.as_deref());
                match &s.license {
                    Some(License::File { path }) if path.trim().is_empty() => {
                        errors.add("license", "license file path is required")
                    }
                    Some(License::Code { code }) if code.trim().is_empty() => {
                        errors.add("license", "license code is required")
                    }
                    _ => {}
                }
            }
            AssetDetails::System(s) => {
                errors.check_ipv4("ip_address", s.ip_address.as_deref());
                errors.check_port("port", s.port);
            }
            AssetDetails::Hardware(h) => {
                errors.require("hardware_type", h.hardware_type.as_deref());
                if let Some(price) = h.purchase_price {
                    if !price.is_finite() || price < 0.0 {
                        errors.add("purchase_price", "purchase_price must be >= 0");
                    }
                }
            }
        }
        errors
    }
}

/// A stored asset with its tags and credentials attached.
///
/// Secret attributes and credential values hold ciphertext when loaded from
/// a repository, and plaintext or the mask once the asset store has
/// resolved them for a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: AssetDetails,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

impl Asset {
    pub fn asset_type(&self) -> AssetType {
        self.details.asset_type()
    }
}

/// Payload for creating or updating an asset.
///
/// On update, `tag_ids: None` and `credentials: None` leave the existing
/// associations untouched; `Some` replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub details: AssetDetails,
    #[serde(default)]
    pub tag_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub credentials: Option<Vec<CredentialInput>>,
}

impl AssetInput {
    /// A minimal input with empty attributes, mostly for tests and imports.
    pub fn new(name: impl Into<String>, details: AssetDetails) -> Self {
        Self {
            name: name.into(),
            description: None,
            details,
            tag_ids: None,
            credentials: None,
        }
    }
}

/// Filter for listing assets of one type.
#[derive(Debug, Clone)]
pub struct AssetFilter {
    pub asset_type: AssetType,
    /// Case-insensitive substring over name, description and identifying attributes.
    pub search: Option<String>,
    /// `key=value` or bare `key` terms, all of which must match.
    pub tags: Vec<TagFilter>,
}

impl AssetFilter {
    pub fn new(asset_type: AssetType) -> Self {
        Self {
            asset_type,
            search: None,
            tags: Vec::new(),
        }
    }
}

/// One term of a tag filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    /// The asset has a tag with this key, any value.
    Key(String),
    /// The asset has exactly this tag.
    Pair(String, String),
}

impl TagFilter {
    /// Parses a comma-separated list such as `env=prod,team`.
    pub fn parse_list(raw: &str) -> Vec<TagFilter> {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .filter_map(|term| match term.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => {
                    Some(TagFilter::Pair(k.trim().to_string(), v.trim().to_string()))
                }
                Some(_) => None,
                None => Some(TagFilter::Key(term.to_string())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_type_parse() {
        assert_eq!("Cloud".parse::<AssetType>().unwrap(), AssetType::Cloud);
        let err = "printer".parse::<AssetType>().unwrap_err();
        assert!(err.message_for("asset_type").is_some());
        assert!(AssetType::Cloud.has_expiry());
        assert!(!AssetType::Server.has_expiry());
    }

    #[test]
    fn test_input_deserializes_tagged_details() {
        let input: AssetInput = serde_json::from_value(serde_json::json!({
            "asset_type": "database",
            "name": "orders-db",
            "db_type": "MySQL",
            "host": "10.0.0.5",
            "port": 3306,
            "databases": ["orders", "billing"],
            "ports": [{"name": "admin", "port": 33062}],
            "tag_ids": [1, 2]
        }))
        .unwrap();

        assert_eq!(input.name, "orders-db");
        assert_eq!(input.tag_ids, Some(vec![1, 2]));
        match &input.details {
            AssetDetails::Database(d) => {
                assert_eq!(d.port, Some(3306));
                assert_eq!(d.databases.len(), 2);
                assert_eq!(d.ports[0].port, 33062);
            }
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_server_defaults_ssh_port() {
        let details: AssetDetails =
            serde_json::from_value(serde_json::json!({"asset_type": "server"})).unwrap();
        match details {
            AssetDetails::Server(s) => assert_eq!(s.ssh_port, 22),
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_database_validation() {
        let details = AssetDetails::Database(DatabaseDetails {
            db_type: Some("PostgreSQL".into()),
            host: None,
            port: Some(70000),
            ..Default::default()
        });
        let errors = details.validate();
        assert!(errors.message_for("host").is_some());
        assert!(errors.message_for("port").is_some());
        assert!(errors.message_for("db_type").is_none());
    }

    #[test]
    fn test_system_validation() {
        let ok = AssetDetails::System(SystemDetails::default());
        assert!(ok.validate().is_empty());

        let bad = AssetDetails::System(SystemDetails {
            ip_address: Some("10.0.0".into()),
            port: Some(0),
            ..Default::default()
        });
        let errors = bad.validate();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_normalize_blank_ip() {
        let mut details = AssetDetails::Cloud(CloudDetails {
            public_ipv4: Some("  ".into()),
            region: Some(" cn-hangzhou ".into()),
            ..Default::default()
        });
        details.normalize();
        assert!(details.validate().is_empty());
        match details {
            AssetDetails::Cloud(c) => {
                assert_eq!(c.public_ipv4, None);
                assert_eq!(c.region.as_deref(), Some("cn-hangzhou"));
            }
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_map_secrets_and_keep_blank() {
        let mut details = AssetDetails::System(SystemDetails {
            default_password: Some("admin123".into()),
            ..Default::default()
        });
        details
            .map_secrets(|s| Ok::<_, ()>(format!("enc({})", s)))
            .unwrap();
        let stored = details.clone();

        let mut update = AssetDetails::System(SystemDetails {
            default_password: Some("".into()),
            ..Default::default()
        });
        update.keep_blank_secrets(&stored);
        assert_eq!(update, stored);

        let mut software = AssetDetails::Software(SoftwareDetails {
            software_name: Some("IDE".into()),
            license: Some(License::Code { code: "".into() }),
            ..Default::default()
        });
        let old = AssetDetails::Software(SoftwareDetails {
            license: Some(License::Code {
                code: "enc(XYZ)".into(),
            }),
            ..Default::default()
        });
        software.keep_blank_secrets(&old);
        match software {
            AssetDetails::Software(s) => assert_eq!(
                s.license,
                Some(License::Code {
                    code: "enc(XYZ)".into()
                })
            ),
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_tag_filter_parse() {
        let filters = TagFilter::parse_list("env=prod, team ,=x,,owner = ops");
        assert_eq!(
            filters,
            vec![
                TagFilter::Pair("env".into(), "prod".into()),
                TagFilter::Key("team".into()),
                TagFilter::Pair("owner".into(), "ops".into()),
            ]
        );
    }

    #[test]
    fn test_search_terms() {
        let details = AssetDetails::Database(DatabaseDetails {
            host: Some("db.internal".into()),
            databases: vec!["orders".into()],
            ..Default::default()
        });
        assert_eq!(details.search_terms(), vec!["db.internal", "orders"]);
    }
}
