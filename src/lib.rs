//! Recovery Core
//!
//! A recovery verification engine. It injects controlled faults into a
//! running application and its datastore, measures how long the system
//! takes to become healthy again, and judges the measurements against
//! declared recovery objectives.
//!
//! # Flow
//!
//! - **Inject**: kill or stop the target process, reset datastore sessions,
//!   abandon slow requests, corrupt a seeded record, or destroy data after
//!   a backup ([`fault`], [`backup`])
//! - **Measure**: poll health checks on a monotonic clock until the target
//!   answers or the window closes ([`probe`])
//! - **Judge**: compare recovery time and data-loss window with the RTO and
//!   RPO targets ([`sla`])
//! - **Report**: aggregate findings and write JSON and HTML reports
//!   ([`report`])
//!
//! Scenarios run sequentially under the [`orchestrator`]. A scenario that
//! fails becomes a finding; only the process exit code signals the overall
//! result.

pub mod backup;
pub mod cli;
pub mod config;
pub mod datastore;
pub mod error;
pub mod fault;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod resilience;
pub mod scenario;
pub mod sla;
pub mod telemetry;

pub use config::HarnessConfig;
pub use error::HarnessError;
pub use orchestrator::{Collaborators, ScenarioOrchestrator};
pub use report::{Finding, RecoveryReport, Severity};
pub use scenario::{Scenario, ScenarioKind};
