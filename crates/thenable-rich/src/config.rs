//! Library Configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RichConfig {
    /// Allow `cancel()` to settle pending promises
    pub cancellation: bool,
    /// Expose `_setAsyncGuaranteed` on the prototype
    pub async_guaranteed_hook: bool,
}

impl Default for RichConfig {
    fn default() -> Self {
        Self {
            cancellation: true,
            async_guaranteed_hook: true,
        }
    }
}
