use crate::error::Ja4PlusError;
use crate::ssh::DEFAULT_SSH_WINDOW;
use std::time::Duration;

/// Runtime options of the JA4+ engine and its capture driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ja4PlusConfig {
    /// Also emit the unhashed `_r` variants of JA4S and JA4X
    pub raw: bool,
    /// SSH packets per JA4SSH observation window
    pub ssh_window: usize,
    /// Maximum number of flows tracked at once by the capture driver
    pub max_flows: usize,
    /// Idle time after which a flow is forgotten
    pub flow_timeout: Duration,
}

impl Default for Ja4PlusConfig {
    fn default() -> Self {
        Self {
            raw: true,
            ssh_window: DEFAULT_SSH_WINDOW,
            max_flows: 65_536,
            flow_timeout: Duration::from_secs(300),
        }
    }
}

impl Ja4PlusConfig {
    pub fn validate(&self) -> Result<(), Ja4PlusError> {
        if self.ssh_window == 0 {
            return Err(Ja4PlusError::Misconfiguration(
                "SSH window must be greater than 0".to_string(),
            ));
        }
        if self.max_flows == 0 {
            return Err(Ja4PlusError::Misconfiguration(
                "Flow table capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
