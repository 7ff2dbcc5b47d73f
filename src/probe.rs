use std::{
    fmt::Display,
    net::{SocketAddr, TcpStream},
    time::Duration,
};

/// Short on purpose. A host that can't complete a handshake within this
/// window is reported closed; the session client uses a longer timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    Open,
    Closed,
}

impl Display for PortStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PortStatus::Open => "open",
                PortStatus::Closed => "closed",
            }
        )
    }
}

/// Bare transport-level reachability check. Any error, refusal or timeout
/// reports `Closed`; the connection is dropped right away.
pub fn check(addr: &SocketAddr) -> PortStatus {
    TcpStream::connect_timeout(addr, PROBE_TIMEOUT)
        .map_or(PortStatus::Closed, |_| PortStatus::Open)
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn reports_open_on_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        assert_eq!(check(&addr), PortStatus::Open);
    }

    #[test]
    fn reports_closed_on_refused_connection() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        assert_eq!(check(&addr), PortStatus::Closed);
    }
}
