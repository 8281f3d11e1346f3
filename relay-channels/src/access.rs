//! Single-user access gate.

/// Allows exactly one platform username.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    allowed: Option<String>,
}

fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('@').to_lowercase()
}

impl AccessGate {
    /// Gate that admits `allowed`. `None` or an empty name admits nobody.
    pub fn new(allowed: Option<&str>) -> Self {
        Self {
            allowed: allowed.map(normalize).filter(|s| !s.is_empty()),
        }
    }

    /// Whether an allow-list entry is configured at all.
    pub fn is_configured(&self) -> bool {
        self.allowed.is_some()
    }

    /// Case-insensitive check of `username`; a leading `@` is ignored.
    pub fn is_authorized(&self, username: Option<&str>) -> bool {
        match (&self.allowed, username) {
            (Some(allowed), Some(name)) => normalize(name) == *allowed,
            _ => false,
        }
    }
}
