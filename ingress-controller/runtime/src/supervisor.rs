//! Supervises the routing process.
//!
//! A single actor task owns the child process handle. Everything else holds a
//! cloneable [`Supervisor`] and sends it commands, so start and stop requests
//! from any task are applied one at a time, in the order they were sent.

use std::{io, path::PathBuf, process::ExitStatus};
use tokio::{
    process::Child,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Duration},
};

/// How to launch the routing process.
#[derive(Clone, Debug)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,

    /// How long the process has to exit after SIGTERM before it is killed.
    pub grace_period: Duration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// No process has been started, or the last one was stopped.
    Stopped,
    Running { pid: u32 },
    /// The process exited without being asked to.
    Exited { code: Option<i32> },
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("routing process is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to terminate routing process: {0}")]
    Terminate(#[source] io::Error),

    #[error("supervisor has shut down")]
    Closed,
}

#[derive(Clone, Debug)]
pub struct Supervisor {
    tx: mpsc::Sender<Command>,
}

#[derive(Debug)]
pub(crate) enum Command {
    Start(oneshot::Sender<Result<u32, SupervisorError>>),
    Stop(oneshot::Sender<Result<(), SupervisorError>>),
    Status(oneshot::Sender<Status>),
    Shutdown(oneshot::Sender<Result<(), SupervisorError>>),
}

struct Actor {
    spec: ProcessSpec,
    rx: mpsc::Receiver<Command>,
    child: Option<Child>,
    status: Status,
}

const COMMAND_BUFFER: usize = 16;

// === impl Supervisor ===

impl Supervisor {
    /// Spawns the actor task and returns a handle to it.
    pub fn spawn(spec: ProcessSpec) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = Actor {
            spec,
            rx,
            child: None,
            status: Status::Stopped,
        };
        (Self { tx }, tokio::spawn(actor.run()))
    }

    /// Launches the routing process, returning its pid.
    ///
    /// Fails with [`SupervisorError::AlreadyRunning`] if it is already live.
    pub async fn start(&self) -> Result<u32, SupervisorError> {
        self.call(Command::Start).await?
    }

    /// Stops the routing process. Does nothing if it is not running.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        self.call(Command::Stop).await?
    }

    pub async fn status(&self) -> Result<Status, SupervisorError> {
        self.call(Command::Status).await
    }

    /// Stops the routing process and terminates the actor.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        self.call(Command::Shutdown).await?
    }

    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn call<T>(
        &self,
        mk: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(mk(tx))
            .await
            .map_err(|_| SupervisorError::Closed)?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }
}

// === impl Actor ===

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Start(tx)) => {
                        let _ = tx.send(self.start());
                    }
                    Some(Command::Stop(tx)) => {
                        let _ = tx.send(self.stop().await);
                    }
                    Some(Command::Status(tx)) => {
                        let _ = tx.send(self.status);
                    }
                    Some(Command::Shutdown(tx)) => {
                        let _ = tx.send(self.stop().await);
                        break;
                    }
                    None => {
                        if let Err(error) = self.stop().await {
                            tracing::warn!(%error, "Failed to stop routing process");
                        }
                        break;
                    }
                },

                status = wait(&mut self.child) => {
                    self.child = None;
                    self.exited(status);
                }
            }
        }
        tracing::debug!("Supervisor terminated");
    }

    fn start(&mut self) -> Result<u32, SupervisorError> {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(None) => {
                    let pid = child.id().unwrap_or_default();
                    tracing::debug!(pid, "Routing process already running");
                    return Err(SupervisorError::AlreadyRunning { pid });
                }
                Ok(Some(status)) => {
                    self.child = None;
                    self.exited(Ok(status));
                }
                Err(error) => {
                    tracing::warn!(%error, "Failed to poll routing process");
                    self.child = None;
                }
            }
        }

        let ProcessSpec {
            program,
            args,
            working_dir,
            ..
        } = &self.spec;
        let child = tokio::process::Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                program: program.clone(),
                source,
            })?;

        let pid = child.id().unwrap_or_default();
        tracing::info!(%program, ?args, pid, "Started routing process");
        self.child = Some(child);
        self.status = Status::Running { pid };
        Ok(pid)
    }

    async fn stop(&mut self) -> Result<(), SupervisorError> {
        let Some(mut child) = self.child.take() else {
            tracing::debug!("Routing process not running");
            self.status = Status::Stopped;
            return Ok(());
        };

        if let Err(error) = terminate(&mut child) {
            tracing::warn!(%error, "Failed to signal routing process");
        }
        match time::timeout(self.spec.grace_period, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(code = ?status.code(), "Routing process stopped");
            }
            Ok(Err(error)) => {
                self.status = Status::Stopped;
                return Err(SupervisorError::Terminate(error));
            }
            Err(_) => {
                tracing::warn!(
                    grace_period = ?self.spec.grace_period,
                    "Routing process did not exit in time; killing it"
                );
                if let Err(error) = child.kill().await {
                    self.status = Status::Stopped;
                    return Err(SupervisorError::Terminate(error));
                }
            }
        }
        self.status = Status::Stopped;
        Ok(())
    }

    fn exited(&mut self, status: io::Result<ExitStatus>) {
        let code = match status {
            Ok(status) => status.code(),
            Err(error) => {
                tracing::warn!(%error, "Failed to wait for routing process");
                None
            }
        };
        tracing::warn!(?code, "Routing process exited unexpectedly");
        self.status = Status::Exited { code };
    }
}

async fn wait(child: &mut Option<Child>) -> io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => futures::future::pending().await,
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn terminate(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: the pid belongs to a child we have not yet reaped, so it cannot
    // have been reused by another process.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str]) -> ProcessSpec {
        ProcessSpec {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: std::env::temp_dir(),
            grace_period: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn start_and_stop() {
        let (supervisor, task) = Supervisor::spawn(spec("sleep", &["30"]));
        assert_eq!(supervisor.status().await.unwrap(), Status::Stopped);

        let pid = supervisor.start().await.expect("must start");
        assert_eq!(
            supervisor.status().await.unwrap(),
            Status::Running { pid }
        );

        supervisor.stop().await.expect("must stop");
        assert_eq!(supervisor.status().await.unwrap(), Status::Stopped);

        supervisor.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn start_is_not_repeated_while_running() {
        let (supervisor, _task) = Supervisor::spawn(spec("sleep", &["30"]));

        let pid = supervisor.start().await.unwrap();
        assert!(matches!(
            supervisor.start().await,
            Err(SupervisorError::AlreadyRunning { pid: p }) if p == pid
        ));
        supervisor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_process_is_a_noop() {
        let (supervisor, _task) = Supervisor::spawn(spec("sleep", &["30"]));
        supervisor.stop().await.unwrap();
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.status().await.unwrap(), Status::Stopped);
    }

    #[tokio::test]
    async fn launch_failures_are_reported() {
        let (supervisor, _task) =
            Supervisor::spawn(spec("/nonexistent/ingress-routing-process", &[]));
        assert!(matches!(
            supervisor.start().await,
            Err(SupervisorError::Launch { .. })
        ));
        assert_eq!(supervisor.status().await.unwrap(), Status::Stopped);
    }

    #[tokio::test]
    async fn exits_are_observed_without_restart() {
        let (supervisor, _task) = Supervisor::spawn(spec("sh", &["-c", "exit 3"]));
        supervisor.start().await.unwrap();

        let status = time::timeout(Duration::from_secs(5), async {
            loop {
                match supervisor.status().await.unwrap() {
                    Status::Running { .. } => time::sleep(Duration::from_millis(10)).await,
                    status => return status,
                }
            }
        })
        .await
        .expect("process must exit");
        assert_eq!(status, Status::Exited { code: Some(3) });

        // A new start launches a fresh process.
        supervisor.start().await.unwrap();
        supervisor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn stuck_processes_are_killed_after_grace_period() {
        let mut spec = spec("sh", &["-c", "trap '' TERM; sleep 30"]);
        spec.grace_period = Duration::from_millis(100);
        let (supervisor, _task) = Supervisor::spawn(spec);

        supervisor.start().await.unwrap();
        // Give the shell time to install its trap.
        time::sleep(Duration::from_millis(200)).await;
        time::timeout(Duration::from_secs(5), supervisor.stop())
            .await
            .expect("stop must not hang")
            .unwrap();
        assert_eq!(supervisor.status().await.unwrap(), Status::Stopped);
    }

    #[tokio::test]
    async fn commands_fail_after_shutdown() {
        let (supervisor, task) = Supervisor::spawn(spec("sleep", &["30"]));
        supervisor.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(
            supervisor.start().await,
            Err(SupervisorError::Closed)
        ));
    }
}
