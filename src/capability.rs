use serde::{Deserialize, Serialize};

/// Result of a platform capability query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// The platform does not expose the API at all
    Unsupported,
    Available,
    /// Exposed, but refused at runtime (policy, missing user activation, DRM)
    Denied,
}

impl Capability {
    pub fn is_available(self) -> bool {
        matches!(self, Capability::Available)
    }
}

/// PiP-related capabilities of one frame context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipCapabilities {
    pub document_pip: Capability,
    pub native_pip: Capability,
}

impl Default for PipCapabilities {
    fn default() -> Self {
        Self {
            document_pip: Capability::Unsupported,
            native_pip: Capability::Available,
        }
    }
}
