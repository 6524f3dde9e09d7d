//! Build notification — one JSON document per UDP datagram from the CI server.

use serde::de::Error as _;
use serde::Deserialize;

/// Top-level notification payload sent by the Jenkins Notification plugin.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildNotification {
    /// Job name, when the CI server includes it.
    #[serde(default)]
    pub name: Option<String>,
    pub build: BuildInfo,
}

/// The `build` object of a notification. Unknown fields are ignored.
///
/// Only `phase` is always present; STARTED notifications carry no `status`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildInfo {
    /// Detail page of this run on the CI server.
    #[serde(default)]
    pub full_url: String,
    pub phase: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub number: Option<u64>,
}

impl BuildNotification {
    /// Decode a raw datagram payload. A build break must name its detail page.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let notification: Self = serde_json::from_slice(payload)?;
        if notification.is_build_break() && notification.build.full_url.is_empty() {
            return Err(serde_json::Error::custom("missing field `full_url`"));
        }
        Ok(notification)
    }

    /// Whether this notification reports a completed, failed build.
    pub fn is_build_break(&self) -> bool {
        is_build_break(&self.build.phase, &self.build.status)
    }
}

/// `phase` must be COMPLETED and `status` must start with FAIL, ignoring case.
pub fn is_build_break(phase: &str, status: &str) -> bool {
    phase.to_uppercase() == "COMPLETED" && status.to_uppercase().starts_with("FAIL")
}
