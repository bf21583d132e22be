//! Authorization policy (C3, §4.3): case-insensitive allow-list membership.

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    allowed: HashSet<String>,
}

impl AuthorizationPolicy {
    /// Builds the policy from the comma-separated `AUTHORIZATION_WHITELIST`
    /// entries. An empty list means every check fails; callers are expected
    /// to log that at startup (see `main`).
    pub fn new(whitelist: &[String]) -> Self {
        let allowed = whitelist
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { allowed }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Whether `source` is permitted to reach the assistant pipeline.
    pub fn is_authorized(&self, source: &str) -> bool {
        self.allowed.contains(source.trim().to_lowercase().as_str())
    }
}
