//! Loads the YAML inventory of Intersight domains.
//!
//! The document lists, per domain, the API endpoint, the key pair used to
//! sign requests, and optionally the serial numbers of the servers to poll:
//!
//! ```yaml
//! ucs_servers:
//!   intersight_domains:
//!     - intersight_domain_ip: https://intersight.com
//!       intersight_key_id: 59c84e4a16267c0001c23428/.../5f2b1c8d7564612d33d0b3c1
//!       intersight_secret_key_path: /config/SecretKey.txt
//!       intersight_servers:
//!         - server: FCH2000AAA
//! ```

use crate::config::parse_timezone;
use crate::core::{DomainDescriptor, KeyMaterial, ServerId};
use crate::error::{BridgeError, BridgeResult};
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize, Default)]
struct InventoryDocument {
    #[serde(default)]
    ucs_servers: Option<UcsServersSection>,
}

#[derive(Debug, Deserialize, Default)]
struct UcsServersSection {
    #[serde(default)]
    intersight_domains: Option<Vec<DomainEntry>>,
}

#[derive(Debug, Deserialize)]
struct DomainEntry {
    intersight_domain_ip: String,
    intersight_key_id: String,
    intersight_secret_key_path: String,
    #[serde(default)]
    intersight_timezone: Option<String>,
    #[serde(default)]
    intersight_servers: Option<Vec<ServerEntry>>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    server: String,
}

/// Reads and parses the inventory file.
///
/// An empty document yields an empty list; the caller decides what to do
/// with no domains.
pub async fn load_from_file(path: &Path) -> BridgeResult<Vec<DomainDescriptor>> {
    info!(path = %path.display(), "Loading Intersight inventory");
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        BridgeError::Config(format!(
            "failed to read inventory file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse(&content)
}

/// Parses an inventory document.
pub fn parse(content: &str) -> BridgeResult<Vec<DomainDescriptor>> {
    if content.trim().is_empty() {
        warn!("Inventory document is empty");
        return Ok(Vec::new());
    }

    let document: Option<InventoryDocument> = serde_yml::from_str(content)
        .map_err(|e| BridgeError::Config(format!("malformed inventory document: {}", e)))?;

    let entries = document
        .and_then(|d| d.ucs_servers)
        .and_then(|s| s.intersight_domains)
        .unwrap_or_default();

    if entries.is_empty() {
        warn!("There are no Intersight domains to monitor");
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| to_descriptor(index, entry))
        .collect()
}

fn to_descriptor(index: usize, entry: DomainEntry) -> BridgeResult<DomainDescriptor> {
    let endpoint_url = parse_endpoint(&entry.intersight_domain_ip).map_err(|e| {
        BridgeError::Config(format!("domain #{}: {}", index, e))
    })?;

    if entry.intersight_key_id.trim().is_empty() {
        return Err(BridgeError::Config(format!(
            "domain #{} ({}): intersight_key_id is empty",
            index, endpoint_url
        )));
    }
    if entry.intersight_secret_key_path.trim().is_empty() {
        return Err(BridgeError::Config(format!(
            "domain #{} ({}): intersight_secret_key_path is empty",
            index, endpoint_url
        )));
    }

    let explicit_servers = entry
        .intersight_servers
        .unwrap_or_default()
        .into_iter()
        .map(|s| ServerId::new(s.server))
        .collect::<BridgeResult<Vec<_>>>()
        .map_err(|e| BridgeError::Config(format!("domain #{} ({}): {}", index, endpoint_url, e)))?;

    let timezone = entry
        .intersight_timezone
        .as_deref()
        .map(parse_timezone)
        .transpose()?;

    debug!(
        domain = %endpoint_url,
        servers = explicit_servers.len(),
        "Loaded inventory entry"
    );

    Ok(DomainDescriptor {
        endpoint_url,
        key_id: entry.intersight_key_id,
        private_key: KeyMaterial::from_config_value(&entry.intersight_secret_key_path),
        explicit_servers,
        timezone,
    })
}

/// Accepts an absolute URL, or a bare host which is then reached over HTTPS.
fn parse_endpoint(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("intersight_domain_ip is empty".to_string());
    }
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => Url::parse(&format!("https://{}", raw))
            .map_err(|e| format!("invalid intersight_domain_ip '{}': {}", raw, e))?,
    };
    if url.host_str().is_none() || !matches!(url.scheme(), "http" | "https") {
        return Err(format!("intersight_domain_ip '{}' is not an HTTP(S) URL", raw));
    }
    Ok(url)
}
