use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default liveness poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Bounded wait for a unit to stop after SIGTERM before it is killed.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Description of one long-running service unit.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, program: PathBuf, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program,
            args,
        }
    }

    fn spawn(&self) -> Result<Child> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.name))?;
        info!("{} process started (PID: {:?})", self.name, child.id());
        Ok(child)
    }
}

/// Process-level watchdog: launches each unit as an isolated child
/// process, relaunches any that die, and tears everything down on the
/// shared cancellation token. Restart is unconditional and not
/// rate-limited beyond the poll interval.
pub struct Supervisor {
    specs: Vec<ServiceSpec>,
    poll_interval: Duration,
    stop_timeout: Duration,
}

impl Supervisor {
    pub fn new(specs: Vec<ServiceSpec>) -> Self {
        Self::with_intervals(specs, POLL_INTERVAL, STOP_TIMEOUT)
    }

    pub fn with_intervals(
        specs: Vec<ServiceSpec>,
        poll_interval: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            specs,
            poll_interval,
            stop_timeout,
        }
    }

    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        let mut units: Vec<(usize, Child)> = Vec::with_capacity(self.specs.len());
        for (i, spec) in self.specs.iter().enumerate() {
            units.push((i, spec.spawn()?));
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => self.poll_units(&mut units),
            }
        }

        info!("stopping all services");
        self.shutdown(units).await;
        info!("all services stopped");
        Ok(())
    }

    fn poll_units(&self, units: &mut [(usize, Child)]) {
        for (i, child) in units.iter_mut() {
            let spec = &self.specs[*i];
            match child.try_wait() {
                Ok(Some(status)) => {
                    warn!("process {} died with {}, restarting", spec.name, status);
                    metrics::counter!("wxgate.supervisor.restarts_total").increment(1);
                    match spec.spawn() {
                        Ok(new_child) => *child = new_child,
                        // The exited child stays in place; the next poll
                        // observes it again and retries the spawn.
                        Err(e) => error!("failed to restart {}: {:#}", spec.name, e),
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("failed to poll {}: {}", spec.name, e),
            }
        }
    }

    async fn shutdown(&self, mut units: Vec<(usize, Child)>) {
        for (i, child) in &units {
            if let Some(pid) = child.id() {
                info!("sending SIGTERM to {} (PID: {})", self.specs[*i].name, pid);
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
            }
        }
        for (i, child) in units.iter_mut() {
            let name = &self.specs[*i].name;
            match timeout(self.stop_timeout, child.wait()).await {
                Ok(Ok(status)) => info!("{} exited with {}", name, status),
                Ok(Err(e)) => warn!("wait for {} failed: {}", name, e),
                Err(_) => {
                    warn!(
                        "{} did not stop within {}s, killing",
                        name,
                        self.stop_timeout.as_secs()
                    );
                    if let Err(e) = child.kill().await {
                        warn!("failed to kill {}: {}", name, e);
                    }
                }
            }
        }
    }
}
