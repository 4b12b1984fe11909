use std::path::PathBuf;
use std::sync::Arc;

use backup_core::{CycleRunner, NoUpdateCheck, Scheduler, SchedulerState, TriggerOutcome, settings};
use tracing::{debug, info, warn};

/// States reported to the host supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

pub trait StatusReporter: Send + Sync {
    fn report(&self, state: ServiceState);
}

/// Used when no supervisor is listening.
pub struct LogReporter;

impl StatusReporter for LogReporter {
    fn report(&self, state: ServiceState) {
        info!("service state: {state:?}");
    }
}

/// Speaks the systemd notify protocol over `$NOTIFY_SOCKET`.
pub struct SystemdNotifier {
    socket: String,
}

impl SystemdNotifier {
    pub fn from_env() -> Option<Self> {
        let socket = std::env::var("NOTIFY_SOCKET").ok()?;
        if socket.trim().is_empty() {
            return None;
        }
        Some(Self { socket })
    }

    fn message(state: ServiceState) -> &'static str {
        match state {
            ServiceState::StartPending => "STATUS=Running startup backup",
            ServiceState::Running => "READY=1\nSTATUS=Backups scheduled",
            ServiceState::StopPending => "STOPPING=1\nSTATUS=Stopping",
            ServiceState::Stopped => "STATUS=Stopped",
        }
    }
}

impl StatusReporter for SystemdNotifier {
    fn report(&self, state: ServiceState) {
        info!("service state: {state:?}");
        if let Err(err) = notify::send(&self.socket, Self::message(state)) {
            warn!("failed to notify supervisor at {}: {err}", self.socket);
        }
    }
}

pub fn reporter_from_env() -> Box<dyn StatusReporter> {
    match SystemdNotifier::from_env() {
        Some(notifier) => {
            debug!("reporting status to systemd at {}", notifier.socket);
            Box::new(notifier)
        }
        None => Box::new(LogReporter),
    }
}

#[cfg(unix)]
mod notify {
    use std::io;
    use std::os::unix::net::UnixDatagram;

    pub fn send(socket: &str, message: &str) -> io::Result<()> {
        let sock = UnixDatagram::unbound()?;
        match socket.strip_prefix('@') {
            Some(name) => send_abstract(&sock, name, message),
            None => sock.send_to(message.as_bytes(), socket).map(|_| ()),
        }
    }

    #[cfg(target_os = "linux")]
    fn send_abstract(sock: &UnixDatagram, name: &str, message: &str) -> io::Result<()> {
        use std::os::linux::net::SocketAddrExt;
        use std::os::unix::net::SocketAddr;

        let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
        sock.send_to_addr(message.as_bytes(), &addr).map(|_| ())
    }

    #[cfg(not(target_os = "linux"))]
    fn send_abstract(_sock: &UnixDatagram, _name: &str, _message: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "abstract notify sockets are Linux-only",
        ))
    }
}

#[cfg(not(unix))]
mod notify {
    pub fn send(_socket: &str, _message: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "notify sockets need a unix host",
        ))
    }
}

/// Bridges host start/stop requests onto the backup scheduler.
pub struct BackupService {
    config_path: PathBuf,
    reporter: Box<dyn StatusReporter>,
    scheduler: Option<Scheduler>,
}

impl BackupService {
    pub fn new(config_path: PathBuf, reporter: Box<dyn StatusReporter>) -> Self {
        Self {
            config_path,
            reporter,
            scheduler: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler
            .as_ref()
            .map(Scheduler::state)
            .unwrap_or(SchedulerState::Stopped)
    }

    /// Load settings, run the first cycle, arm the timer, then report running.
    pub async fn on_start(&mut self) -> Option<TriggerOutcome> {
        if self.state() == SchedulerState::Running {
            warn!("start requested while already running");
            return None;
        }

        self.reporter.report(ServiceState::StartPending);

        let settings = settings::load(&self.config_path);
        info!(
            watched = %settings.watched_data_path.display(),
            backup_root = %settings.backup_root_path.display(),
            runs_per_day = settings.runs_per_day.get(),
            retention_enabled = settings.retention_enabled,
            retention_count = settings.retention_count,
            "settings loaded"
        );

        let mut scheduler = Scheduler::new(CycleRunner::new(settings, Arc::new(NoUpdateCheck)));
        let first = scheduler.start().await;
        self.scheduler = Some(scheduler);

        self.reporter.report(ServiceState::Running);
        first
    }

    pub async fn on_stop(&mut self) {
        self.reporter.report(ServiceState::StopPending);
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.reporter.report(ServiceState::Stopped);
    }
}
