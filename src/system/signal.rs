use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;

pub const DEFAULT_ELEVATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Term,
    Kill,
    Stop,
    Cont,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::Term,
        SignalKind::Kill,
        SignalKind::Stop,
        SignalKind::Cont,
    ];

    /// Name as understood by `kill -s`.
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Term => "TERM",
            SignalKind::Kill => "KILL",
            SignalKind::Stop => "STOP",
            SignalKind::Cont => "CONT",
        }
    }

    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            SignalKind::Term => libc::SIGTERM,
            SignalKind::Kill => libc::SIGKILL,
            SignalKind::Stop => libc::SIGSTOP,
            SignalKind::Cont => libc::SIGCONT,
        }
    }

    #[cfg(not(unix))]
    fn to_sysinfo(self) -> sysinfo::Signal {
        match self {
            SignalKind::Term => sysinfo::Signal::Term,
            SignalKind::Kill => sysinfo::Signal::Kill,
            SignalKind::Stop => sysinfo::Signal::Stop,
            SignalKind::Cont => sysinfo::Signal::Continue,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown signal `{0}`, expected one of term, kill, stop, cont")]
pub struct ParseSignalError(String);

impl FromStr for SignalKind {
    type Err = ParseSignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        SignalKind::ALL
            .into_iter()
            .find(|kind| kind.name() == bare)
            .ok_or_else(|| ParseSignalError(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalErrorKind {
    Vanished,
    Timeout,
    ElevationFailed,
    Unknown,
}

/// Result of one `send_signal` call. Failures are reported here rather than
/// as an `Err`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignalOutcome {
    pub succeeded: bool,
    pub required_elevation: bool,
    pub error: Option<SignalErrorKind>,
    pub detail: Option<String>,
}

impl SignalOutcome {
    fn delivered(required_elevation: bool) -> Self {
        SignalOutcome {
            succeeded: true,
            required_elevation,
            error: None,
            detail: None,
        }
    }

    /// The dispatch task itself died before producing an outcome.
    pub(crate) fn aborted(detail: String) -> Self {
        Self::failed(false, SignalErrorKind::Unknown, Some(detail))
    }

    fn failed(required_elevation: bool, error: SignalErrorKind, detail: Option<String>) -> Self {
        SignalOutcome {
            succeeded: false,
            required_elevation,
            error: Some(error),
            detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("no such process")]
    NoSuchProcess,
    #[error("signal not supported on this platform")]
    Unsupported,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElevationError {
    #[error("elevation helper did not finish within {0:?}")]
    Timeout(Duration),
    #[error("elevation helper exited with {status:?}: {stderr}")]
    Rejected { status: Option<i32>, stderr: String },
    #[error("failed to run elevation helper: {0}")]
    Spawn(String),
}

/// Unprivileged signal delivery.
pub trait SignalDelivery: Send + Sync {
    fn deliver(&self, pid: u32, kind: SignalKind) -> Result<(), DeliveryError>;
}

/// Privileged retry after a permission denial.
pub trait Elevation: Send + Sync {
    fn deliver_elevated(
        &self,
        pid: u32,
        kind: SignalKind,
    ) -> impl Future<Output = Result<(), ElevationError>> + Send;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

#[cfg(unix)]
impl SignalDelivery for OsSignals {
    fn deliver(&self, pid: u32, kind: SignalKind) -> Result<(), DeliveryError> {
        // kill(2) treats 0 and negative pids as process-group addresses.
        let raw_pid = libc::pid_t::try_from(pid)
            .ok()
            .filter(|&p| p > 0)
            .ok_or(DeliveryError::NoSuchProcess)?;

        // SAFETY: plain syscall on a positive pid, no memory is shared.
        let rc = unsafe { libc::kill(raw_pid, kind.raw()) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EPERM) => Err(DeliveryError::PermissionDenied),
            Some(libc::ESRCH) => Err(DeliveryError::NoSuchProcess),
            _ => Err(DeliveryError::Other(err.to_string())),
        }
    }
}

#[cfg(not(unix))]
impl SignalDelivery for OsSignals {
    fn deliver(&self, pid: u32, kind: SignalKind) -> Result<(), DeliveryError> {
        use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

        if pid == 0 || pid > i32::MAX as u32 {
            return Err(DeliveryError::NoSuchProcess);
        }
        let target = [Pid::from_u32(pid)];
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&target),
            true,
            ProcessRefreshKind::nothing(),
        );
        let process = sys.process(target[0]).ok_or(DeliveryError::NoSuchProcess)?;
        match process.kill_with(kind.to_sysinfo()) {
            Some(true) => Ok(()),
            Some(false) => Err(DeliveryError::PermissionDenied),
            None => Err(DeliveryError::Unsupported),
        }
    }
}

/// Runs an external helper such as `sudo kill` for the elevated attempt.
///
/// `{signal}` and `{pid}` in the argv template are substituted before the
/// helper is spawned. The child is killed if the timeout elapses.
#[derive(Debug, Clone)]
pub struct CommandElevation {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandElevation {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        CommandElevation { argv, timeout }
    }

    pub fn default_argv() -> Vec<String> {
        ["sudo", "kill", "-s", "{signal}", "{pid}"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn render(&self, pid: u32, kind: SignalKind) -> Vec<String> {
        let pid = pid.to_string();
        self.argv
            .iter()
            .map(|arg| arg.replace("{signal}", kind.name()).replace("{pid}", &pid))
            .collect()
    }
}

impl Default for CommandElevation {
    fn default() -> Self {
        Self::new(Self::default_argv(), DEFAULT_ELEVATION_TIMEOUT)
    }
}

impl Elevation for CommandElevation {
    async fn deliver_elevated(&self, pid: u32, kind: SignalKind) -> Result<(), ElevationError> {
        let argv = self.render(pid, kind);
        let Some((program, args)) = argv.split_first() else {
            return Err(ElevationError::Spawn("empty elevation command".to_string()));
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ElevationError::Spawn(format!("{program}: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| ElevationError::Spawn(e.to_string()))?,
            Err(_) => return Err(ElevationError::Timeout(self.timeout)),
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(ElevationError::Rejected {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

pub struct SignalDispatcher<D = OsSignals, E = CommandElevation> {
    delivery: D,
    elevation: E,
}

impl Default for SignalDispatcher {
    fn default() -> Self {
        Self::new(OsSignals, CommandElevation::default())
    }
}

impl<D: SignalDelivery, E: Elevation> SignalDispatcher<D, E> {
    pub fn new(delivery: D, elevation: E) -> Self {
        SignalDispatcher {
            delivery,
            elevation,
        }
    }

    /// Deliver `kind` to `pid`, retrying once through the elevation helper
    /// if the direct attempt is refused.
    pub async fn send_signal(&self, pid: u32, kind: SignalKind) -> SignalOutcome {
        match self.delivery.deliver(pid, kind) {
            Ok(()) => {
                tracing::info!(pid, signal = kind.name(), "signal delivered");
                SignalOutcome::delivered(false)
            }
            Err(DeliveryError::NoSuchProcess) => {
                tracing::info!(pid, signal = kind.name(), "signal target does not exist");
                SignalOutcome::failed(false, SignalErrorKind::Vanished, None)
            }
            Err(DeliveryError::PermissionDenied) => {
                tracing::warn!(pid, signal = kind.name(), "permission denied, retrying elevated");
                self.send_elevated(pid, kind).await
            }
            Err(err) => {
                tracing::warn!(pid, signal = kind.name(), error = %err, "signal delivery failed");
                SignalOutcome::failed(false, SignalErrorKind::Unknown, Some(err.to_string()))
            }
        }
    }

    async fn send_elevated(&self, pid: u32, kind: SignalKind) -> SignalOutcome {
        match self.elevation.deliver_elevated(pid, kind).await {
            Ok(()) => {
                tracing::info!(pid, signal = kind.name(), "signal delivered with elevation");
                SignalOutcome::delivered(true)
            }
            Err(err @ ElevationError::Timeout(_)) => {
                tracing::warn!(pid, signal = kind.name(), error = %err, "elevated signal timed out");
                SignalOutcome::failed(true, SignalErrorKind::Timeout, Some(err.to_string()))
            }
            Err(err) => {
                tracing::warn!(pid, signal = kind.name(), error = %err, "elevated signal failed");
                let detail = match err {
                    ElevationError::Rejected { ref stderr, .. } if !stderr.is_empty() => {
                        stderr.clone()
                    }
                    ref other => other.to_string(),
                };
                SignalOutcome::failed(true, SignalErrorKind::ElevationFailed, Some(detail))
            }
        }
    }
}
