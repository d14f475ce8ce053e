//! Trusted-subnet filtering of claimed client addresses

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::error::{PulseError, PulseResult};

/// CIDR-based request filter.
///
/// The claimed client IP arrives out-of-band (a forwarded-IP header). A
/// request is accepted only if the IP parses and falls inside the subnet;
/// missing, unparseable and out-of-subnet addresses are all rejected the
/// same way, without revealing which check failed.
#[derive(Debug, Clone)]
pub struct TrustedSubnet {
    subnet: IpNet,
}

impl TrustedSubnet {
    /// Parse a CIDR string such as `"192.168.0.0/16"`
    pub fn parse(cidr: &str) -> PulseResult<Self> {
        let subnet = IpNet::from_str(cidr)
            .map_err(|e| PulseError::unexpected(format!("bad trusted subnet {:?}: {}", cidr, e)))?;
        Ok(Self { subnet })
    }

    /// Whether the claimed IP is allowed through
    pub fn allows(&self, claimed_ip: Option<&str>) -> bool {
        claimed_ip
            .and_then(|raw| raw.trim().parse::<IpAddr>().ok())
            .map(|ip| self.subnet.contains(&ip))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_inside_subnet_is_accepted() {
        let subnet = TrustedSubnet::parse("192.168.0.0/16").unwrap();
        assert!(subnet.allows(Some("192.168.0.10")));
    }

    #[test]
    fn ip_outside_subnet_is_rejected() {
        let subnet = TrustedSubnet::parse("192.168.0.0/16").unwrap();
        assert!(!subnet.allows(Some("10.0.0.1")));
    }

    #[test]
    fn missing_or_garbage_ip_is_rejected() {
        let subnet = TrustedSubnet::parse("192.168.0.0/16").unwrap();
        assert!(!subnet.allows(None));
        assert!(!subnet.allows(Some("")));
        assert!(!subnet.allows(Some("not-an-ip")));
    }

    #[test]
    fn bad_cidr_is_an_error() {
        assert!(TrustedSubnet::parse("192.168.0.0/99").is_err());
    }
}
