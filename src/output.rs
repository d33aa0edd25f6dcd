use crate::session::Field;
use std::fmt;
use std::fmt::Formatter;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpPort {
    pub ip: IpAddr,
    pub port: u16,
}

impl IpPort {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for IpPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.port)
    }
}

/// One fingerprint produced for a flow by the capture driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintOutput {
    /// The side that opened the flow
    pub client: IpPort,
    pub server: IpPort,
    pub field: Field,
    pub value: String,
}

impl fmt::Display for FingerprintOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ".-[ {} -> {} ({}) ]-\n\
            |\n\
            | {:<9}= {}\n\
            `----\n",
            self.client,
            self.server,
            self.field.expression(),
            self.field.friendly_name(),
            self.value,
        )
    }
}
