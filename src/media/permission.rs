//! Capture permission gate.
//!
//! The OS prompt itself lives with the UI collaborator; the session only
//! asks and waits for the answer.

use async_trait::async_trait;

use crate::error::Result;

/// Device capability a session needs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Microphone,
    Camera,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Ask for every capability in `capabilities`. Granted only if all are.
    async fn request(&self, capabilities: &[Capability]) -> Result<PermissionOutcome>;
}

/// Gate for platforms without a runtime permission prompt.
pub struct GrantAll;

#[async_trait]
impl PermissionGate for GrantAll {
    async fn request(&self, _capabilities: &[Capability]) -> Result<PermissionOutcome> {
        Ok(PermissionOutcome::Granted)
    }
}
