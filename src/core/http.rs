use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

const APP_USER_AGENT: &str = concat!("MinecraftLauncher/", env!("CARGO_PKG_VERSION"));

/// Default bound for a single connect or read on any request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the shared client. Every attempt is bounded by `timeout` for the
/// connect phase and again for each read, so a stalled mirror gives up
/// instead of hanging while a slow but live download keeps going.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
}

/// Human-readable reachability line for `url`, used by diagnostics.
pub async fn check_url_availability(client: &Client, url: &str) -> String {
    debug!("Checking availability of {}", url);
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            format!(
                "{}: HTTP {} {}",
                url,
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        }
        Err(err) if err.is_timeout() => format!("{}: timed out", url),
        Err(err) if err.is_connect() => format!("{}: connection failed ({})", url, err),
        Err(err) => format!("{}: {}", url, err),
    }
}

// ── Connectivity ────────────────────────────────────

/// `true` when `probe_url` answers with a success status within five seconds.
pub async fn check_internet_connection(client: &Client, probe_url: &str) -> bool {
    match client.get(probe_url).timeout(CONNECTIVITY_TIMEOUT).send().await {
        Ok(response) => response.status().is_success(),
        Err(err) => {
            debug!("Connectivity probe {} failed: {}", probe_url, err);
            false
        }
    }
}

/// Host name and the addresses it resolves to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkInfo {
    pub host_name: Option<String>,
    pub addresses: Vec<String>,
}

pub async fn network_info() -> NetworkInfo {
    let Some(host_name) = sysinfo::System::host_name() else {
        return NetworkInfo::default();
    };

    let mut addresses = Vec::new();
    match tokio::net::lookup_host((host_name.as_str(), 0)).await {
        Ok(resolved) => {
            for addr in resolved {
                let ip = addr.ip().to_string();
                if !addresses.contains(&ip) {
                    addresses.push(ip);
                }
            }
        }
        Err(err) => warn!("Cannot resolve host name {}: {}", host_name, err),
    }

    NetworkInfo {
        host_name: Some(host_name),
        addresses,
    }
}
