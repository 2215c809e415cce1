//! Fault injection against the target system.
//!
//! Every method returns `Ok(true)` when the fault was induced, `Ok(false)`
//! when there was nothing to fault (target already down, mutation matched
//! nothing), and `Err` only when the injection mechanism itself broke.
//! Calling a method twice never errors just because the first call worked.

mod process;

pub use process::{ProcessControl, ProcessSelector, Signal, SystemProcessControl};

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::datastore::DataStore;
use crate::error::InjectionError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Induces process, network, timeout and data faults.
pub struct FaultInjector {
    target_url: String,
    process: Option<Arc<dyn ProcessControl>>,
    store: Option<Arc<dyn DataStore>>,
    connection_addr: Option<String>,
}

impl FaultInjector {
    /// Injector aimed at `target_url`. Process, datastore and connection
    /// targets are attached separately.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            process: None,
            store: None,
            connection_addr: None,
        }
    }

    pub fn with_process(mut self, process: Arc<dyn ProcessControl>) -> Self {
        self.process = Some(process);
        self
    }

    pub fn with_datastore(mut self, store: Arc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// `host:port` whose session [`drop_connection`](Self::drop_connection) resets.
    pub fn with_connection_target(mut self, addr: impl Into<String>) -> Self {
        self.connection_addr = Some(addr.into());
        self
    }

    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    pub fn has_datastore(&self) -> bool {
        self.store.is_some()
    }

    pub fn has_connection_target(&self) -> bool {
        self.connection_addr.is_some()
    }

    fn process(&self) -> Result<&Arc<dyn ProcessControl>, InjectionError> {
        self.process
            .as_ref()
            .ok_or(InjectionError::NotConfigured("target process"))
    }

    /// SIGKILL every process matching the target.
    pub async fn kill_process(&self) -> Result<bool, InjectionError> {
        let process = self.process()?;
        let pids = process.find().await?;
        if pids.is_empty() {
            info!("No target process running; nothing to kill");
            return Ok(false);
        }

        let mut killed = false;
        for pid in pids {
            if process.signal(pid, Signal::Kill).await? {
                info!(pid, "Target process killed");
                killed = true;
            }
        }
        Ok(killed)
    }

    /// SIGTERM the target, wait up to `timeout` for exit, then SIGKILL
    /// whatever is left.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> Result<bool, InjectionError> {
        let process = self.process()?;
        let pids = process.find().await?;
        if pids.is_empty() {
            info!("No target process running; nothing to stop");
            return Ok(false);
        }

        let mut signalled = Vec::with_capacity(pids.len());
        for pid in pids {
            if process.signal(pid, Signal::Term).await? {
                signalled.push(pid);
            }
        }
        if signalled.is_empty() {
            return Ok(false);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let mut remaining = Vec::new();
            for pid in &signalled {
                if process.is_running(*pid).await {
                    remaining.push(*pid);
                }
            }
            if remaining.is_empty() {
                info!(timeout_secs = timeout.as_secs_f64(), "Target exited after SIGTERM");
                return Ok(true);
            }
            if Instant::now() >= deadline {
                for pid in remaining {
                    warn!(pid, "Target ignored SIGTERM; forcing kill");
                    process.signal(pid, Signal::Kill).await?;
                }
                return Ok(true);
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
    }

    /// Open a session to the datastore and tear it down with a TCP reset.
    pub async fn drop_connection(&self) -> Result<bool, InjectionError> {
        let addr = self
            .connection_addr
            .as_deref()
            .ok_or(InjectionError::NotConfigured("connection target"))?;

        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                info!(addr, error = %e, "Connection target unreachable; nothing to drop");
                return Ok(false);
            }
            Err(_) => {
                return Err(InjectionError::Connection {
                    addr: addr.to_string(),
                    reason: "connect timed out".to_string(),
                })
            }
        };

        // Let the server send its greeting so the session is established.
        let mut stream = stream;
        let mut greeting = [0u8; 256];
        let _ = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut greeting)).await;

        stream
            .set_linger(Some(Duration::ZERO))
            .map_err(|e| InjectionError::Connection {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        drop(stream);
        info!(addr, "Datastore session reset");
        Ok(true)
    }

    /// Issue a request to the target with a deliberately tiny budget.
    pub async fn induce_timeout(&self, budget: Duration) -> Result<bool, InjectionError> {
        let client = reqwest::Client::builder()
            .timeout(budget)
            .build()
            .map_err(|e| InjectionError::Client(e.to_string()))?;

        match client.get(&self.target_url).send().await {
            Err(e) if e.is_timeout() => {
                info!(budget_ms = budget.as_millis() as u64, "Request timed out as intended");
                Ok(true)
            }
            Err(e) => {
                debug!(error = %e, "Request failed without timing out");
                Ok(false)
            }
            Ok(resp) => {
                debug!(status = resp.status().as_u16(), "Request completed within budget");
                Ok(false)
            }
        }
    }

    /// Run `mutation` directly against the datastore, bypassing the application.
    pub async fn corrupt_data(&self, mutation: &str) -> Result<bool, InjectionError> {
        let store = self
            .store
            .as_ref()
            .ok_or(InjectionError::NotConfigured("datastore"))?;
        let rows = store
            .execute(mutation)
            .await
            .map_err(|e| InjectionError::Mutation(e.to_string()))?;
        info!(rows, "Datastore mutation applied");
        Ok(rows > 0)
    }
}
