//! Spreadsheet rows to asset inputs.
//!
//! A sheet has one header row followed by one asset per row. Headers are
//! matched loosely: `"CPU (cores)*"` and `"cpu"` name the same column.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::{
    Asset, AssetDetails, AssetInput, AssetType, CloudDetails, CredentialInput, CredentialKind,
    DatabaseDetails, DatabasePort, HardwareDetails, License, ServerDetails, SoftwareDetails,
    SystemDetails,
};

/// One data row keyed by normalized header.
pub type SheetRow = HashMap<String, String>;

/// Outcome of a batch import. Row numbers in `errors` count the header as
/// row 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchImportResult {
    pub created_count: usize,
    pub errors: Vec<String>,
}

/// A converted row: the asset plus `key=value` tags still to be resolved.
#[derive(Debug, Clone)]
pub struct RowDraft {
    pub input: AssetInput,
    pub tags: Vec<(String, String)>,
}

const CREDENTIALS_HEADER: &str = "Credentials (type|key|value|description; ...)";
const TAGS_HEADER: &str = "Tags (key=value, ...)";

/// Header row and one example row of the import template for a type.
pub fn template(asset_type: AssetType) -> (Vec<&'static str>, Vec<&'static str>) {
    let (headers, sample): (&[&str], &[&str]) = match asset_type {
        AssetType::Server => (
            &[
                "Name*", "Purpose", "CPU (cores)", "Memory (GB)", "Public IPv4", "Private IPv4",
                "Platform", "CPU Architecture", "OS Name", "OS Version", "SSH Port",
                CREDENTIALS_HEADER, TAGS_HEADER, "Notes",
            ],
            &[
                "web-01", "Web frontend", "8", "16", "1.2.3.4", "192.168.1.100", "Linux",
                "x86_64", "Ubuntu", "22.04", "22", "password|root|changeme|root account",
                "env=prod", "Test server",
            ],
        ),
        AssetType::Cloud => (
            &[
                "Name*", "Instance ID", "Instance Name", "Region", "Zone", "Public IPv4",
                "Private IPv4", "Instance Type", "CPU (cores)", "Memory (GB)", "Disk Space (GB)",
                "OS Name", "OS Version", "Purchase Date (YYYY-MM-DD)", "Expires At (YYYY-MM-DD)",
                CREDENTIALS_HEADER, TAGS_HEADER, "Notes",
            ],
            &[
                "ecs-01", "i-123456", "ecs-01", "cn-beijing", "cn-beijing-a", "1.2.3.4",
                "192.168.1.100", "ecs.t5-lc1m1.small", "2", "4", "40", "Ubuntu", "22.04",
                "2024-01-01", "2025-01-01",
                "password|root|changeme|root account;password|ubuntu|changeme|ubuntu account",
                "env=prod,team=ops", "Test instance",
            ],
        ),
        AssetType::System => (
            &[
                "Name*", "IP Address", "Port", "Default Account", "Default Password",
                "Login URL", CREDENTIALS_HEADER, TAGS_HEADER, "Notes",
            ],
            &[
                "Git", "192.168.1.100", "8080", "admin", "changeme",
                "http://192.168.1.100:8080", "password|git|changeme|service account",
                "env=prod", "Internal Git",
            ],
        ),
        AssetType::Database => (
            &[
                "Name*", "DB Type*", "Host*", "Port*", "Ports (name:port, ...)", "Databases",
                "Quota", CREDENTIALS_HEADER, TAGS_HEADER, "Notes",
            ],
            &[
                "clickhouse-cluster", "ClickHouse", "192.168.1.100", "9000",
                "HTTP:8123,Native:9000", "db1\ndb2\ndb3", "500GB",
                "password|default|changeme|", "env=prod", "Analytics cluster",
            ],
        ),
        AssetType::Hardware => (
            &[
                "Name*", "Hardware Type*", "Brand", "Model", "Serial Number",
                "Purchase Date (YYYY-MM-DD)", "Purchase Price", "Responsible Person", "User",
                "Usage Area", TAGS_HEADER, "Notes",
            ],
            &[
                "dev-001", "PC", "Lenovo", "ThinkPad X1", "SN123456", "2024-01-01", "8000",
                "Alice", "Bob", "Office A", "team=dev", "Developer laptop",
            ],
        ),
        AssetType::Software => (
            &[
                "Name*", "Software Name*", "Login URL", "Login Account", "Phone",
                "License Code", CREDENTIALS_HEADER, TAGS_HEADER, "Notes",
            ],
            &[
                "jetbrains", "IntelliJ IDEA", "https://account.jetbrains.com", "ops@example.com",
                "", "XXXX-XXXX-XXXX", "", "team=dev", "10 seats",
            ],
        ),
    };
    (headers.to_vec(), sample.to_vec())
}

/// `"CPU (cores)*"` -> `"cpu"`, `"OS Name"` -> `"os_name"`.
pub fn normalize_header(header: &str) -> String {
    let head = header.split('(').next().unwrap_or_default();
    head.trim()
        .trim_end_matches('*')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Turns a decoded table (header row first) into keyed rows.
///
/// Rows shorter than the header are padded with blanks.
pub fn rows_from_table(table: Vec<Vec<String>>) -> Vec<SheetRow> {
    let mut rows = table.into_iter();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|h| normalize_header(h)).collect(),
        None => return Vec::new(),
    };

    rows.map(|cells| {
        headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| (h.clone(), cells.get(i).cloned().unwrap_or_default()))
            .collect()
    })
    .collect()
}

/// True when every cell of the row is blank.
pub fn is_blank_row(row: &SheetRow) -> bool {
    row.values().all(|v| v.trim().is_empty())
}

/// Converts one row into an asset input of `asset_type`.
pub fn convert_row(asset_type: AssetType, row: &SheetRow) -> Result<RowDraft, String> {
    let cells = Cells(row);

    let details = match asset_type {
        AssetType::Server => AssetDetails::Server(ServerDetails {
            purpose: cells.text("purpose"),
            cpu: cells.sized("cpu", &["核", "C", "c"], "C")?,
            memory: cells.sized("memory", &["GB", "gb", "G", "g"], "GB")?,
            public_ipv4: cells.text("public_ipv4"),
            private_ipv4: cells.text("private_ipv4"),
            cpu_architecture: cells.text("cpu_architecture"),
            platform: cells.text("platform"),
            os_name: cells.text("os_name"),
            os_version: cells.text("os_version"),
            ssh_port: cells.int("ssh_port")?.unwrap_or(22),
            notes: cells.text("notes"),
            ..Default::default()
        }),
        AssetType::Cloud => AssetDetails::Cloud(CloudDetails {
            instance_id: cells.text("instance_id"),
            instance_name: cells.text("instance_name"),
            region: cells.text("region"),
            zone: cells.text("zone"),
            public_ipv4: cells.text("public_ipv4"),
            private_ipv4: cells.text("private_ipv4"),
            instance_type: cells.text("instance_type"),
            cpu: cells.sized("cpu", &["核", "C", "c"], "C")?,
            memory: cells.sized("memory", &["GB", "gb", "G", "g"], "GB")?,
            disk_space: cells.sized("disk_space", &["GB", "gb", "G", "g"], "GB")?,
            os_name: cells.text("os_name"),
            os_version: cells.text("os_version"),
            ssh_port: cells.int("ssh_port")?.unwrap_or(22),
            purchase_date: cells.date("purchase_date")?,
            expires_at: cells
                .date("expires_at")?
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt)),
            notes: cells.text("notes"),
            ..Default::default()
        }),
        AssetType::Database => AssetDetails::Database(DatabaseDetails {
            db_type: cells.text("db_type"),
            host: cells.text("host"),
            port: cells.int("port")?,
            ports: parse_ports(cells.text("ports").as_deref())?,
            databases: parse_databases(cells.text("databases").as_deref()),
            quota: cells.text("quota"),
            notes: cells.text("notes"),
        }),
        AssetType::Software => AssetDetails::Software(SoftwareDetails {
            software_name: cells.text("software_name"),
            login_url: cells.text("login_url"),
            login_account: cells.text("login_account"),
            phone: cells.text("phone"),
            license: cells.text("license_code").map(|code| License::Code { code }),
            notes: cells.text("notes"),
        }),
        AssetType::System => AssetDetails::System(SystemDetails {
            ip_address: cells.text("ip_address"),
            port: cells.int("port")?,
            default_account: cells.text("default_account"),
            default_password: cells.text("default_password"),
            login_url: cells.text("login_url"),
            notes: cells.text("notes"),
        }),
        AssetType::Hardware => AssetDetails::Hardware(HardwareDetails {
            hardware_type: cells.text("hardware_type"),
            brand: cells.text("brand"),
            model: cells.text("model"),
            serial_number: cells.text("serial_number"),
            purchase_date: cells.date("purchase_date")?,
            purchase_price: cells.float("purchase_price")?,
            responsible_person: cells.text("responsible_person"),
            user: cells.text("user"),
            usage_area: cells.text("usage_area"),
            notes: cells.text("notes"),
        }),
    };

    let mut input = AssetInput::new(cells.text("name").unwrap_or_default(), details);
    input.description = cells.text("description");
    let credentials = parse_credentials(cells.text("credentials").as_deref())?;
    if !credentials.is_empty() {
        input.credentials = Some(credentials);
    }

    Ok(RowDraft {
        input,
        tags: parse_tags(cells.text("tags").as_deref())?,
    })
}

/// Text of the column `field` (a normalized header) for an exported asset.
///
/// Unknown fields and the credentials column yield an empty cell.
pub fn export_cell(asset: &Asset, field: &str) -> String {
    fn opt(v: &Option<String>) -> String {
        v.clone().unwrap_or_default()
    }
    fn num<T: ToString>(v: Option<T>) -> String {
        v.map(|n| n.to_string()).unwrap_or_default()
    }

    match field {
        "id" => return asset.id.to_string(),
        "name" => return asset.name.clone(),
        "description" => return opt(&asset.description),
        "tags" => {
            return asset
                .tags
                .iter()
                .map(|t| t.label())
                .collect::<Vec<_>>()
                .join(",")
        }
        "created_at" => return asset.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => {}
    }

    match &asset.details {
        AssetDetails::Server(s) => match field {
            "purpose" => opt(&s.purpose),
            "cpu" => opt(&s.cpu),
            "memory" => opt(&s.memory),
            "public_ipv4" => opt(&s.public_ipv4),
            "private_ipv4" => opt(&s.private_ipv4),
            "platform" => opt(&s.platform),
            "cpu_architecture" => opt(&s.cpu_architecture),
            "os_name" => opt(&s.os_name),
            "os_version" => opt(&s.os_version),
            "ssh_port" => s.ssh_port.to_string(),
            "notes" => opt(&s.notes),
            _ => String::new(),
        },
        AssetDetails::Cloud(c) => match field {
            "instance_id" => opt(&c.instance_id),
            "instance_name" => opt(&c.instance_name),
            "region" => opt(&c.region),
            "zone" => opt(&c.zone),
            "public_ipv4" => opt(&c.public_ipv4),
            "private_ipv4" => opt(&c.private_ipv4),
            "instance_type" => opt(&c.instance_type),
            "cpu" => opt(&c.cpu),
            "memory" => opt(&c.memory),
            "disk_space" => opt(&c.disk_space),
            "os_name" => opt(&c.os_name),
            "os_version" => opt(&c.os_version),
            "purchase_date" => num(c.purchase_date),
            "expires_at" => c
                .expires_at
                .map(|e| e.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            "notes" => opt(&c.notes),
            _ => String::new(),
        },
        AssetDetails::Database(d) => match field {
            "db_type" => opt(&d.db_type),
            "host" => opt(&d.host),
            "port" => num(d.port),
            "ports" => d
                .ports
                .iter()
                .map(|p| format!("{}:{}", p.name, p.port))
                .collect::<Vec<_>>()
                .join(","),
            "databases" => d.databases.join("\n"),
            "quota" => opt(&d.quota),
            "notes" => opt(&d.notes),
            _ => String::new(),
        },
        AssetDetails::Software(s) => match field {
            "software_name" => opt(&s.software_name),
            "login_url" => opt(&s.login_url),
            "login_account" => opt(&s.login_account),
            "phone" => opt(&s.phone),
            "license_code" => match &s.license {
                Some(License::Code { code }) => code.clone(),
                _ => String::new(),
            },
            "notes" => opt(&s.notes),
            _ => String::new(),
        },
        AssetDetails::System(s) => match field {
            "ip_address" => opt(&s.ip_address),
            "port" => num(s.port),
            "default_account" => opt(&s.default_account),
            "default_password" => opt(&s.default_password),
            "login_url" => opt(&s.login_url),
            "notes" => opt(&s.notes),
            _ => String::new(),
        },
        AssetDetails::Hardware(h) => match field {
            "hardware_type" => opt(&h.hardware_type),
            "brand" => opt(&h.brand),
            "model" => opt(&h.model),
            "serial_number" => opt(&h.serial_number),
            "purchase_date" => num(h.purchase_date),
            "purchase_price" => num(h.purchase_price),
            "responsible_person" => opt(&h.responsible_person),
            "user" => opt(&h.user),
            "usage_area" => opt(&h.usage_area),
            "notes" => opt(&h.notes),
            _ => String::new(),
        },
    }
}

/// Column headers of the CSV export: the import template without the
/// credentials column, framed by id and creation time.
pub fn export_headers(asset_type: AssetType) -> Vec<&'static str> {
    let (headers, _) = template(asset_type);
    let mut columns = vec!["ID"];
    columns.extend(
        headers
            .into_iter()
            .filter(|h| *h != CREDENTIALS_HEADER),
    );
    columns.push("Created At");
    columns
}

struct Cells<'a>(&'a SheetRow);

impl Cells<'_> {
    fn text(&self, field: &str) -> Option<String> {
        self.0
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn int(&self, field: &str) -> Result<Option<i64>, String> {
        match self.text(field) {
            None => Ok(None),
            Some(raw) => parse_int(&raw)
                .map(Some)
                .ok_or_else(|| format!("{} must be an integer, got '{}'", field, raw)),
        }
    }

    fn float(&self, field: &str) -> Result<Option<f64>, String> {
        match self.text(field) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("{} must be a number, got '{}'", field, raw)),
        }
    }

    /// A number with an optional unit suffix, stored as `<n><unit>`.
    fn sized(&self, field: &str, suffixes: &[&str], unit: &str) -> Result<Option<String>, String> {
        let Some(raw) = self.text(field) else {
            return Ok(None);
        };
        let number = suffixes
            .iter()
            .find_map(|s| raw.strip_suffix(s))
            .unwrap_or(&raw)
            .trim();
        parse_int(number)
            .map(|n| Some(format!("{}{}", n, unit)))
            .ok_or_else(|| format!("{} must be a number, got '{}'", field, raw))
    }

    fn date(&self, field: &str) -> Result<Option<NaiveDate>, String> {
        match self.text(field) {
            None => Ok(None),
            Some(raw) => parse_date(&raw)
                .map(Some)
                .ok_or_else(|| format!("{} must be a date (YYYY-MM-DD), got '{}'", field, raw)),
        }
    }
}

/// Integers, tolerating the `8.0` spreadsheets produce for numeric cells.
fn parse_int(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
}

/// `type|key|value|description` entries separated by `;`.
fn parse_credentials(raw: Option<&str>) -> Result<Vec<CredentialInput>, String> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let mut credentials = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
        if parts.len() < 3 {
            return Err(format!(
                "credential '{}' must look like type|key|value|description",
                entry
            ));
        }

        let credential_type = if parts[0].is_empty() {
            CredentialKind::Password
        } else {
            parts[0].parse::<CredentialKind>().map_err(|e| e.summary())?
        };
        let mut credential = CredentialInput::new(credential_type, parts[1], parts[2]);
        if let Some(description) = parts.get(3).filter(|d| !d.is_empty()) {
            credential = credential.with_description(*description);
        }
        credentials.push(credential);
    }
    Ok(credentials)
}

/// `name:port` entries separated by `,`.
fn parse_ports(raw: Option<&str>) -> Result<Vec<DatabasePort>, String> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|entry| {
            let (name, port) = entry
                .rsplit_once(':')
                .ok_or_else(|| format!("port '{}' must look like name:port", entry))?;
            let port = parse_int(port.trim())
                .ok_or_else(|| format!("port '{}' must look like name:port", entry))?;
            Ok(DatabasePort {
                name: name.trim().to_string(),
                port,
            })
        })
        .collect()
}

/// Database names separated by newlines or commas, first occurrence kept.
fn parse_databases(raw: Option<&str>) -> Vec<String> {
    let mut databases: Vec<String> = Vec::new();
    for name in raw
        .unwrap_or_default()
        .split(['\n', ','])
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        if !databases.iter().any(|d| d == name) {
            databases.push(name.to_string());
        }
    }
    databases
}

/// `key=value` entries separated by `,`.
fn parse_tags(raw: Option<&str>) -> Result<Vec<(String, String)>, String> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|term| match term.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
            _ => Err(format!("tag '{}' must look like key=value", term)),
        })
        .collect()
}
