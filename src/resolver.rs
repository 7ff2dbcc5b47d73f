use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use url::Host;

use crate::error::AuditError;

/// FTP control port. The scan probes this port only.
pub const FTP_PORT: u16 = 21;

pub fn lookup(target: &str) -> Result<SocketAddr, AuditError> {
    let addr = match Host::parse(target).map_err(AuditError::HostParseFailed)? {
        Host::Domain(domain) => (domain.as_str(), FTP_PORT)
            .to_socket_addrs()
            .map_err(AuditError::ResolverFailed)?
            .next()
            .ok_or_else(|| AuditError::HostLookupFailed(target.into()))?,
        Host::Ipv4(ip) => SocketAddr::new(IpAddr::V4(ip), FTP_PORT),
        Host::Ipv6(ip) => SocketAddr::new(IpAddr::V6(ip), FTP_PORT),
    };

    log::debug!("Target `{}` maps to `{}`", target, addr);

    Ok(addr)
}
