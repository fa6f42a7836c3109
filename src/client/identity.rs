//! Visitor identity: a best-effort key for vote and visit deduplication.
//!
//! Not a credential. Two visitors behind one address share an identity, and
//! anyone can spoof one; anonymous participation is worth that trade.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

/// Resolves the identity votes and visits are recorded under. Never fails.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_identity(&self) -> String;

    /// User agent reported alongside visits, if known.
    fn user_agent(&self) -> Option<String> {
        None
    }
}

/// What the client knows about its runtime environment, for the fallback fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEnvironment {
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Minutes behind UTC, positive west of Greenwich
    pub timezone_offset_minutes: i32,
}

impl ClientEnvironment {
    /// Deterministic composite: `{user_agent}-{width}x{height}-{offset}`.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}-{}x{}-{}",
            self.user_agent, self.screen_width, self.screen_height, self.timezone_offset_minutes
        )
    }

    /// Environment of the current process, for headless clients.
    pub fn current() -> Self {
        let offset = chrono::Local::now().offset().local_minus_utc() / 60;
        Self {
            user_agent: format!("resource-directory/{}", env!("CARGO_PKG_VERSION")),
            screen_width: 0,
            screen_height: 0,
            timezone_offset_minutes: -offset,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    ip: String,
}

/// Looks up the public IP once per instance, falling back to the fingerprint.
pub struct IpLookupIdentity {
    client: Client,
    lookup_url: String,
    environment: ClientEnvironment,
    resolved: OnceCell<String>,
}

impl IpLookupIdentity {
    pub fn new(lookup_url: impl Into<String>, environment: ClientEnvironment) -> Self {
        Self {
            client: Client::new(),
            lookup_url: lookup_url.into(),
            environment,
            resolved: OnceCell::new(),
        }
    }

    async fn lookup(&self) -> Result<String, reqwest::Error> {
        let response: IpLookupResponse = self
            .client
            .get(&self.lookup_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.ip)
    }
}

#[async_trait]
impl IdentityProvider for IpLookupIdentity {
    async fn resolve_identity(&self) -> String {
        self.resolved
            .get_or_init(|| async {
                match self.lookup().await {
                    Ok(ip) if !ip.trim().is_empty() => ip,
                    Ok(_) => {
                        tracing::warn!("IP lookup returned an empty address, using fingerprint");
                        self.environment.fingerprint()
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "IP lookup failed, using fingerprint");
                        self.environment.fingerprint()
                    }
                }
            })
            .await
            .clone()
    }

    fn user_agent(&self) -> Option<String> {
        Some(self.environment.user_agent.clone())
    }
}

/// A fixed identity, e.g. an authenticated session id.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    id: String,
}

impl SessionIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl IdentityProvider for SessionIdentity {
    async fn resolve_identity(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment() -> ClientEnvironment {
        ClientEnvironment {
            user_agent: "Mozilla/5.0".to_string(),
            screen_width: 1920,
            screen_height: 1080,
            timezone_offset_minutes: -330,
        }
    }

    #[test]
    fn test_fingerprint_format() {
        assert_eq!(environment().fingerprint(), "Mozilla/5.0-1920x1080--330");
    }

    #[tokio::test]
    async fn test_unreachable_lookup_falls_back_to_fingerprint() {
        // Port 9 (discard) on loopback refuses connections
        let identity = IpLookupIdentity::new("http://127.0.0.1:9/ip", environment());
        let resolved = identity.resolve_identity().await;
        assert_eq!(resolved, environment().fingerprint());
        // Cached after the first resolution
        assert_eq!(identity.resolve_identity().await, resolved);
    }

    #[tokio::test]
    async fn test_session_identity_is_fixed() {
        let identity = SessionIdentity::new("visitor-a");
        assert_eq!(identity.resolve_identity().await, "visitor-a");
        assert!(identity.user_agent().is_none());
    }
}
