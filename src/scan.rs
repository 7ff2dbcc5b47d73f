use std::{
    fmt::Display,
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    error::{AuditError, SessionError},
    probe::PortStatus,
    report::HostLog,
    resolver,
    session::{Dial, Dialer, FtpSession},
};

mod creds;

const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Username/password the server conventionally accepts without real
/// credentials.
const ANONYMOUS: (&str, &str) = ("anonymous", "anonymous@");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    PortClosed,
    BannerUnreachable,
    AnonymousAllowed,
    CredentialFound,
    NoCredentialFound,
    Error,
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ScanStatus::PortClosed => "port-closed",
                ScanStatus::BannerUnreachable => "banner-unreachable",
                ScanStatus::AnonymousAllowed => "anonymous-allowed",
                ScanStatus::CredentialFound => "credential-found",
                ScanStatus::NoCredentialFound => "no-credential-found",
                ScanStatus::Error => "error",
            }
        )
    }
}

/// One observation about a host, never mutated after creation.
#[derive(Debug, Clone)]
pub struct Finding {
    pub at: DateTime<Local>,
    pub message: String,
}

#[derive(Debug)]
pub struct ScanResult {
    pub target: String,
    pub status: ScanStatus,
    pub findings: Vec<Finding>,
    pub elapsed: Duration,
}

/// Drives a single host through the probe sequence: port check, banner,
/// anonymous login, credential sweep, FTPS check. Probes are strictly
/// sequential; at most one session is open at any time.
pub struct HostScan<'a, D: Dial> {
    target: &'a str,
    dialer: D,
    log: HostLog,
    findings: Vec<Finding>,
}

impl<'a, D: Dial> HostScan<'a, D> {
    pub fn new(target: &'a str, dialer: D, log: HostLog) -> Self {
        Self {
            target,
            dialer,
            log,
            findings: Vec::new(),
        }
    }

    fn record(&mut self, message: String) {
        self.log.record(&message);
        self.findings.push(Finding {
            at: Local::now(),
            message,
        });
    }

    pub fn run(mut self) -> ScanResult {
        let started = Instant::now();

        self.log
            .record(&format!("--- FTP Scan Result for {} ---", self.target));
        self.log.record(&format!(
            "Scan started at: {}",
            Local::now().format(TIMESTAMP_FMT)
        ));

        let status = self.drive();

        self.log.record(&format!("Status: {}", status));
        self.log.record(&format!(
            "Scan completed at: {}",
            Local::now().format(TIMESTAMP_FMT)
        ));
        self.log
            .record("---------------------------------------------");

        ScanResult {
            target: self.target.to_owned(),
            status,
            findings: self.findings,
            elapsed: started.elapsed(),
        }
    }

    fn drive(&mut self) -> ScanStatus {
        let port = self.dialer.probe();
        log::debug!("Control port of `{}` is {}", self.target, port);

        if port == PortStatus::Closed {
            self.record(format!(
                "FTP port 21 is not open on {}. Finishing scan.",
                self.target
            ));
            return ScanStatus::PortClosed;
        }
        self.record(format!("FTP port 21 is open on {}", self.target));

        let mut session = match self.dialer.plain() {
            Ok(session) => session,
            Err(e) => {
                self.record(format!("Could not retrieve server banner: {}", e));
                return ScanStatus::BannerUnreachable;
            }
        };

        let banner = match session.banner() {
            Ok(banner) => banner,
            Err(e) => {
                session.close();
                self.record(format!("Could not retrieve server banner: {}", e));
                return ScanStatus::BannerUnreachable;
            }
        };
        self.record(format!("Server Banner: {}", banner));

        let status = match session.login(ANONYMOUS.0, ANONYMOUS.1) {
            Ok(()) => {
                self.record(format!("Anonymous login is allowed on {}.", self.target));
                self.list_root(session.as_mut());
                session.close();
                ScanStatus::AnonymousAllowed
            }
            Err(SessionError::PermissionDenied(reply)) => {
                session.close();
                self.record(format!("Anonymous login is not allowed on {}.", self.target));
                self.record(format!("Server response: {}", reply));
                self.credential_sweep()
            }
            Err(e) => {
                session.close();
                self.record(format!(
                    "Could not connect to FTP server on {}: {}",
                    self.target, e
                ));
                ScanStatus::Error
            }
        };

        // The banner came back, so the encrypted-channel support check
        // runs whatever the login phases concluded. Its outcome is a
        // finding only and never touches the terminal status.
        self.encrypted_check();

        status
    }

    /// Best-effort root listing after an anonymous success; a failure
    /// here doesn't invalidate the anonymous-access finding.
    fn list_root(&mut self, session: &mut dyn FtpSession) {
        self.record("Listing directories for anonymous access:".to_owned());

        match session.list(None) {
            Ok(entries) => {
                for entry in entries {
                    self.record(entry);
                }
            }
            Err(e) => self.record(format!("Directory listing failed: {}", e)),
        }
    }

    /// Tries the built-in pairs in declared order over a fresh session
    /// each. First success wins; a denial moves on; an inconclusive
    /// failure on one pair never aborts the rest of the sweep.
    fn credential_sweep(&mut self) -> ScanStatus {
        for (user, pass) in creds::DEFAULT_CREDENTIALS {
            let mut session = match self.dialer.plain() {
                Ok(session) => session,
                Err(e) => {
                    self.record(format!(
                        "Could not perform login check with {}/{}: {}",
                        user, pass, e
                    ));
                    continue;
                }
            };

            let outcome = session.login(user, pass);
            session.close();

            match outcome {
                Ok(()) => {
                    self.record(format!(
                        "Login successful with credentials: {}/{}",
                        user, pass
                    ));
                    return ScanStatus::CredentialFound;
                }
                Err(SessionError::PermissionDenied(_)) => {
                    self.record(format!("Login failed for: {}/{}", user, pass));
                }
                Err(e) => {
                    self.record(format!(
                        "Could not perform login check with {}/{}: {}",
                        user, pass, e
                    ));
                }
            }
        }

        ScanStatus::NoCredentialFound
    }

    fn encrypted_check(&mut self) {
        match self.dialer.secure() {
            Ok(mut session) => {
                match session.login(ANONYMOUS.0, ANONYMOUS.1) {
                    Ok(()) => self
                        .record("FTPS supported. Anonymous login successful over FTPS".to_owned()),
                    Err(e) => self.record(format!("FTPS check failed: {}", e)),
                }
                session.close();
            }
            Err(e) => self.record(format!("FTPS check failed: {}", e)),
        }
    }
}

/// Fans targets out across a bounded pool, one scan per worker. `start`
/// returns only once every target's scan has terminated.
pub struct Orchestrator {
    targets: Vec<String>,
    workers: usize,
}

impl Orchestrator {
    pub fn new(targets: Vec<String>, workers: usize) -> Self {
        Self { targets, workers }
    }

    pub fn start(&self) -> Result<Vec<ScanResult>, AuditError> {
        self.dispatch(scan_host)
    }

    fn dispatch<R, F>(&self, task: F) -> Result<Vec<R>, AuditError>
    where
        R: Send,
        F: Fn(&str) -> R + Sync,
    {
        if self.workers == 0 {
            return Err(AuditError::InvalidWorkerCount);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(AuditError::WorkerPoolFailed)?;

        log::debug!(
            "Dispatching {} targets across {} workers",
            self.targets.len(),
            self.workers
        );

        Ok(pool.install(|| self.targets.par_iter().map(|t| task(t)).collect()))
    }
}

fn scan_host(target: &str) -> ScanResult {
    let started = Instant::now();

    let mut log = match HostLog::create(target) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Skipping {}: {}", target, e);
            return ScanResult {
                target: target.to_owned(),
                status: ScanStatus::Error,
                findings: Vec::new(),
                elapsed: started.elapsed(),
            };
        }
    };

    match resolver::lookup(target) {
        Ok(addr) => HostScan::new(target, Dialer::new(addr, target), log).run(),
        Err(e) => resolve_failed(target, log, &e, started),
    }
}

/// Resolution failures still get a framed log and a finding, so the
/// durable output and the returned result agree.
fn resolve_failed(
    target: &str,
    mut log: HostLog,
    error: &AuditError,
    started: Instant,
) -> ScanResult {
    log.record(&format!("--- FTP Scan Result for {} ---", target));

    let message = format!("Could not resolve {}: {}. Finishing scan.", target, error);
    log.record(&message);
    let findings = vec![Finding {
        at: Local::now(),
        message,
    }];

    log.record(&format!("Status: {}", ScanStatus::Error));
    log.record("---------------------------------------------");

    ScanResult {
        target: target.to_owned(),
        status: ScanStatus::Error,
        findings,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        fs,
        rc::Rc,
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use suppaftp::FtpError;

    use super::*;

    struct MockSession {
        banner: Option<&'static str>,
        login: Option<Result<(), SessionError>>,
        listing: Option<Result<Vec<String>, SessionError>>,
        open: bool,
        closed: Rc<Cell<usize>>,
    }

    impl FtpSession for MockSession {
        fn banner(&mut self) -> Result<String, SessionError> {
            self.banner.map(str::to_owned).ok_or(SessionError::Banner)
        }

        fn login(&mut self, _user: &str, _pass: &str) -> Result<(), SessionError> {
            self.login.take().expect("login called twice on one session")
        }

        fn list(&mut self, _path: Option<&str>) -> Result<Vec<String>, SessionError> {
            self.listing.take().expect("unexpected list call")
        }

        fn retrieve(&mut self, _name: &str) -> Result<Vec<u8>, SessionError> {
            Ok(b"contents".to_vec())
        }

        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.closed.set(self.closed.get() + 1);
            }
        }
    }

    struct MockDial {
        port: PortStatus,
        plain: RefCell<VecDeque<Result<MockSession, SessionError>>>,
        secure: RefCell<Option<Result<MockSession, SessionError>>>,
    }

    impl MockDial {
        fn new(
            port: PortStatus,
            plain: Vec<Result<MockSession, SessionError>>,
            secure: Option<Result<MockSession, SessionError>>,
        ) -> Self {
            Self {
                port,
                plain: RefCell::new(plain.into_iter().collect()),
                secure: RefCell::new(secure),
            }
        }
    }

    impl Dial for MockDial {
        fn probe(&self) -> PortStatus {
            self.port
        }

        fn plain(&self) -> Result<Box<dyn FtpSession>, SessionError> {
            self.plain
                .borrow_mut()
                .pop_front()
                .expect("scan dialed a plain session it shouldn't have")
                .map(|s| Box::new(s) as Box<dyn FtpSession>)
        }

        fn secure(&self) -> Result<Box<dyn FtpSession>, SessionError> {
            self.secure
                .borrow_mut()
                .take()
                .expect("scan dialed a secure session it shouldn't have")
                .map(|s| Box::new(s) as Box<dyn FtpSession>)
        }
    }

    fn session(closed: &Rc<Cell<usize>>, login: Result<(), SessionError>) -> MockSession {
        MockSession {
            banner: Some("220 mock ftpd ready"),
            login: Some(login),
            listing: Some(Ok(Vec::new())),
            open: true,
            closed: Rc::clone(closed),
        }
    }

    fn denied() -> SessionError {
        SessionError::PermissionDenied("530 Login incorrect.".to_owned())
    }

    fn inconclusive() -> SessionError {
        SessionError::Auth(FtpError::BadResponse)
    }

    fn ftps_declined() -> SessionError {
        SessionError::EncryptionUnsupported("server declined AUTH TLS".to_owned())
    }

    fn run_scan(name: &str, dial: MockDial) -> ScanResult {
        let log = HostLog::create_in(&std::env::temp_dir(), name).unwrap();
        HostScan::new("10.0.0.9", dial, log).run()
    }

    fn messages(result: &ScanResult) -> Vec<&str> {
        result.findings.iter().map(|f| f.message.as_str()).collect()
    }

    #[test]
    fn closed_port_stops_the_scan() {
        let dial = MockDial::new(PortStatus::Closed, Vec::new(), None);

        let result = run_scan("mock-closed", dial);

        assert_eq!(result.status, ScanStatus::PortClosed);
        assert_eq!(
            messages(&result),
            ["FTP port 21 is not open on 10.0.0.9. Finishing scan."]
        );
    }

    #[test]
    fn missing_banner_is_terminal() {
        let closed = Rc::new(Cell::new(0));
        let mut bad = session(&closed, Ok(()));
        bad.banner = None;

        let dial = MockDial::new(PortStatus::Open, vec![Ok(bad)], None);

        let result = run_scan("mock-banner", dial);

        assert_eq!(result.status, ScanStatus::BannerUnreachable);
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn anonymous_success_skips_the_sweep() {
        let closed = Rc::new(Cell::new(0));
        let mut anon = session(&closed, Ok(()));
        anon.listing = Some(Ok(vec!["readme.txt".to_owned()]));

        let dial = MockDial::new(PortStatus::Open, vec![Ok(anon)], Some(Err(ftps_declined())));

        let result = run_scan("mock-anon", dial);

        assert_eq!(result.status, ScanStatus::AnonymousAllowed);
        let msgs = messages(&result);
        assert!(msgs.contains(&"Server Banner: 220 mock ftpd ready"));
        assert!(msgs.contains(&"Anonymous login is allowed on 10.0.0.9."));
        assert!(msgs.contains(&"readme.txt"));
        assert!(!msgs.iter().any(|m| m.starts_with("Login failed for:")));
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn listing_failure_keeps_anonymous_finding() {
        let closed = Rc::new(Cell::new(0));
        let mut anon = session(&closed, Ok(()));
        anon.listing = Some(Err(SessionError::Protocol(FtpError::BadResponse)));

        let dial = MockDial::new(PortStatus::Open, vec![Ok(anon)], Some(Err(ftps_declined())));

        let result = run_scan("mock-anon-nolist", dial);

        assert_eq!(result.status, ScanStatus::AnonymousAllowed);
        assert!(messages(&result)
            .iter()
            .any(|m| m.starts_with("Directory listing failed:")));
    }

    #[test]
    fn sweep_stops_at_first_successful_pair() {
        let closed = Rc::new(Cell::new(0));

        // Anonymous denied, then four denials before guest/<blank> works.
        let plain = vec![
            Ok(session(&closed, Err(denied()))),
            Ok(session(&closed, Err(denied()))),
            Ok(session(&closed, Err(denied()))),
            Ok(session(&closed, Err(denied()))),
            Ok(session(&closed, Err(denied()))),
            Ok(session(&closed, Ok(()))),
        ];
        let dial = MockDial::new(PortStatus::Open, plain, Some(Err(ftps_declined())));

        let result = run_scan("mock-sweep-hit", dial);

        assert_eq!(result.status, ScanStatus::CredentialFound);
        let failures: Vec<&str> = messages(&result)
            .into_iter()
            .filter(|m| m.starts_with("Login failed for:"))
            .collect();
        assert_eq!(
            failures,
            [
                "Login failed for: admin/admin",
                "Login failed for: ftp/ftp",
                "Login failed for: user/pass",
                "Login failed for: guest/guest",
            ]
        );
        assert!(messages(&result)
            .contains(&"Login successful with credentials: guest/"));
        // Anonymous session plus five sweep sessions, all released.
        assert_eq!(closed.get(), 6);
    }

    #[test]
    fn inconclusive_pair_never_aborts_the_sweep() {
        let closed = Rc::new(Cell::new(0));

        let mut plain = vec![
            Ok(session(&closed, Err(denied()))),
            Ok(session(&closed, Err(inconclusive()))),
            Err(SessionError::Connect(FtpError::BadResponse)),
        ];
        plain.extend((0..5).map(|_| Ok(session(&closed, Err(denied())))));

        let dial = MockDial::new(PortStatus::Open, plain, Some(Err(ftps_declined())));

        let result = run_scan("mock-sweep-cont", dial);

        assert_eq!(result.status, ScanStatus::NoCredentialFound);
        let msgs = messages(&result);
        assert!(msgs
            .iter()
            .any(|m| m.starts_with("Could not perform login check with admin/admin:")));
        assert!(msgs
            .iter()
            .any(|m| m.starts_with("Could not perform login check with ftp/ftp:")));
        assert_eq!(
            msgs.iter()
                .filter(|m| m.starts_with("Login failed for:"))
                .count(),
            5
        );
        assert_eq!(closed.get(), 7);
    }

    #[test]
    fn ftps_outcome_never_changes_the_status() {
        let closed = Rc::new(Cell::new(0));

        let mut plain = vec![Ok(session(&closed, Err(denied())))];
        plain.extend((0..7).map(|_| Ok(session(&closed, Err(denied())))));

        let dial = MockDial::new(
            PortStatus::Open,
            plain,
            Some(Ok(session(&closed, Ok(())))),
        );

        let result = run_scan("mock-ftps-ok", dial);

        assert_eq!(result.status, ScanStatus::NoCredentialFound);
        assert!(messages(&result)
            .contains(&"FTPS supported. Anonymous login successful over FTPS"));
        assert_eq!(closed.get(), 9);
    }

    #[test]
    fn unexpected_anonymous_error_is_terminal_but_ftps_still_runs() {
        let closed = Rc::new(Cell::new(0));

        let dial = MockDial::new(
            PortStatus::Open,
            vec![Ok(session(&closed, Err(inconclusive())))],
            Some(Err(ftps_declined())),
        );

        let result = run_scan("mock-anon-error", dial);

        assert_eq!(result.status, ScanStatus::Error);
        let msgs = messages(&result);
        assert!(msgs
            .iter()
            .any(|m| m.starts_with("Could not connect to FTP server on 10.0.0.9:")));
        assert!(msgs.iter().any(|m| m.starts_with("FTPS check failed:")));
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn log_ends_with_a_status_line() {
        let host = "mock-status-line";
        let path = std::env::temp_dir().join(format!("{}_ftp_checker.txt", host));
        let _ = fs::remove_file(&path);

        let dial = MockDial::new(PortStatus::Closed, Vec::new(), None);
        let result = run_scan(host, dial);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&format!("Status: {}", result.status)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn resolver_failure_is_reported_as_a_finding() {
        let dir = std::env::temp_dir();
        let host = "mock-resolve-fail";
        let path = dir.join(format!("{}_ftp_checker.txt", host));
        let _ = fs::remove_file(&path);

        let log = HostLog::create_in(&dir, host).unwrap();
        let error = AuditError::HostLookupFailed("nosuchhost.invalid".to_owned());
        let result = resolve_failed("nosuchhost.invalid", log, &error, Instant::now());

        assert_eq!(result.status, ScanStatus::Error);
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0]
            .message
            .starts_with("Could not resolve nosuchhost.invalid:"));

        // The log got the same message plus the usual framing.
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&result.findings[0].message));
        assert!(contents.contains("Status: error"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn every_dispatched_target_gets_its_own_log() {
        let dir = std::env::temp_dir().join(format!("ftpaudit-log-count-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let targets: Vec<String> = (0..6).map(|i| format!("192.0.2.{}", i)).collect();
        let orchestrator = Orchestrator::new(targets.clone(), 3);

        orchestrator
            .dispatch(|target| {
                let mut log = HostLog::create_in(&dir, target).unwrap();
                log.record(target);
            })
            .unwrap();

        assert_eq!(fs::read_dir(&dir).unwrap().count(), targets.len());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn dispatch_bounds_concurrency_and_keeps_order() {
        let targets: Vec<String> = (0..8).map(|i| format!("10.0.0.{}", i)).collect();
        let orchestrator = Orchestrator::new(targets.clone(), 2);

        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = orchestrator
            .dispatch(|target| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                active.fetch_sub(1, Ordering::SeqCst);
                target.to_owned()
            })
            .unwrap();

        assert_eq!(results, targets);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let orchestrator = Orchestrator::new(vec!["10.0.0.1".to_owned()], 0);

        assert!(matches!(
            orchestrator.dispatch(|t| t.to_owned()),
            Err(AuditError::InvalidWorkerCount)
        ));
    }

    #[test]
    fn statuses_render_as_kebab_case() {
        assert_eq!(ScanStatus::PortClosed.to_string(), "port-closed");
        assert_eq!(ScanStatus::CredentialFound.to_string(), "credential-found");
        assert_eq!(
            ScanStatus::NoCredentialFound.to_string(),
            "no-credential-found"
        );
    }
}
