use std::{net::SocketAddr, time::Duration};

use suppaftp::{
    native_tls::TlsConnector, FtpError, FtpStream, NativeTlsConnector, NativeTlsFtpStream, Status,
};

use crate::{
    error::SessionError,
    probe::{self, PortStatus},
};

/// Longer than the probe timeout since authentication round-trips add
/// latency on top of the handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One live FTP control connection. Exclusively owned by the scan that
/// opened it; `close` is idempotent and also runs on drop, so no exit
/// path leaks a descriptor.
pub trait FtpSession {
    fn banner(&mut self) -> Result<String, SessionError>;
    fn login(&mut self, user: &str, pass: &str) -> Result<(), SessionError>;
    fn list(&mut self, path: Option<&str>) -> Result<Vec<String>, SessionError>;
    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>, SessionError>;
    fn close(&mut self);
}

/// Seam between the scan state machine and the network. Every session is
/// opened fresh through here; post-auth protocol state can't be cleanly
/// reset in place, so a new connection per attempt avoids residual-state
/// bugs.
pub trait Dial {
    fn probe(&self) -> PortStatus;
    fn plain(&self) -> Result<Box<dyn FtpSession>, SessionError>;
    fn secure(&self) -> Result<Box<dyn FtpSession>, SessionError>;
}

pub struct Dialer {
    addr: SocketAddr,
    domain: String,
}

impl Dialer {
    pub fn new(addr: SocketAddr, domain: impl Into<String>) -> Self {
        Self {
            addr,
            domain: domain.into(),
        }
    }
}

impl Dial for Dialer {
    fn probe(&self) -> PortStatus {
        probe::check(&self.addr)
    }

    fn plain(&self) -> Result<Box<dyn FtpSession>, SessionError> {
        let stream =
            FtpStream::connect_timeout(self.addr, CONNECT_TIMEOUT).map_err(SessionError::Connect)?;

        stream
            .get_ref()
            .set_read_timeout(Some(CONNECT_TIMEOUT))
            .and_then(|_| stream.get_ref().set_write_timeout(Some(CONNECT_TIMEOUT)))
            .map_err(|e| SessionError::Connect(FtpError::ConnectionError(e)))?;

        log::debug!("Opened plain session with `{}`", self.addr);

        Ok(Box::new(PlainSession {
            stream: Some(stream),
        }))
    }

    fn secure(&self) -> Result<Box<dyn FtpSession>, SessionError> {
        let stream = NativeTlsFtpStream::connect_timeout(self.addr, CONNECT_TIMEOUT)
            .map_err(SessionError::Connect)?;

        stream
            .get_ref()
            .set_read_timeout(Some(CONNECT_TIMEOUT))
            .and_then(|_| stream.get_ref().set_write_timeout(Some(CONNECT_TIMEOUT)))
            .map_err(|e| SessionError::Connect(FtpError::ConnectionError(e)))?;

        // The check only establishes whether the server offers a protected
        // channel at all; certificate validity is not part of the audit.
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| SessionError::EncryptionUnsupported(e.to_string()))?;

        let stream = stream
            .into_secure(NativeTlsConnector::from(connector), &self.domain)
            .map_err(|e| SessionError::EncryptionUnsupported(e.to_string()))?;

        log::debug!("Upgraded session with `{}` to TLS", self.addr);

        Ok(Box::new(SecureSession {
            stream: Some(stream),
        }))
    }
}

/// An FTP 530 reply is an explicit credential rejection; anything else
/// leaves the attempt inconclusive.
fn classify_login(err: FtpError) -> SessionError {
    match err {
        FtpError::UnexpectedResponse(ref resp) if resp.status == Status::NotLoggedIn => {
            SessionError::PermissionDenied(
                String::from_utf8_lossy(&resp.body).trim_end().to_string(),
            )
        }
        FtpError::ConnectionError(_) => SessionError::Connect(err),
        _ => SessionError::Auth(err),
    }
}

struct PlainSession {
    stream: Option<FtpStream>,
}

impl FtpSession for PlainSession {
    fn banner(&mut self) -> Result<String, SessionError> {
        self.stream
            .as_ref()
            .and_then(|s| s.get_welcome_msg())
            .map(|msg| msg.trim_end().to_string())
            .ok_or(SessionError::Banner)
    }

    fn login(&mut self, user: &str, pass: &str) -> Result<(), SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
        stream.login(user, pass).map_err(classify_login)
    }

    fn list(&mut self, path: Option<&str>) -> Result<Vec<String>, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
        stream.list(path).map_err(SessionError::Protocol)
    }

    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
        stream
            .retr_as_buffer(name)
            .map(|buffer| buffer.into_inner())
            .map_err(SessionError::Protocol)
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Best-effort QUIT; the descriptor goes away either way.
            let _ = stream.quit();
        }
    }
}

impl Drop for PlainSession {
    fn drop(&mut self) {
        self.close();
    }
}

struct SecureSession {
    stream: Option<NativeTlsFtpStream>,
}

impl FtpSession for SecureSession {
    fn banner(&mut self) -> Result<String, SessionError> {
        self.stream
            .as_ref()
            .and_then(|s| s.get_welcome_msg())
            .map(|msg| msg.trim_end().to_string())
            .ok_or(SessionError::Banner)
    }

    fn login(&mut self, user: &str, pass: &str) -> Result<(), SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
        stream.login(user, pass).map_err(classify_login)
    }

    fn list(&mut self, path: Option<&str>) -> Result<Vec<String>, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
        stream.list(path).map_err(SessionError::Protocol)
    }

    fn retrieve(&mut self, name: &str) -> Result<Vec<u8>, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::Closed)?;
        stream
            .retr_as_buffer(name)
            .map(|buffer| buffer.into_inner())
            .map_err(SessionError::Protocol)
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.quit();
        }
    }
}

impl Drop for SecureSession {
    fn drop(&mut self) {
        self.close();
    }
}
