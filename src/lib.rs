//! Business intelligence orchestration engine.
//!
//! Tracks provider health, matches tasks to routing rules, dispatches
//! provider calls in parallel or as a pipeline under a deadline, fails over
//! to configured alternates and synthesizes one result per task.
//!
//! The entry point is [`Orchestrator`]:
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use bi_orchestrator::{BusinessTask, Config, Orchestrator};
//!
//! let orchestrator = Orchestrator::from_config(&Config::default())?;
//! orchestrator.initialize().await;
//!
//! let task = BusinessTask::builder("security_audit")
//!     .capability("security")
//!     .build()?;
//! let result = orchestrator.execute_business_task(task).await?;
//! println!("success: {}", result.success);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod routing;
pub mod synthesis;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use models::{BusinessTask, OrchestrationResult, OrchestrationRule, TaskPriority};
pub use orchestrator::Orchestrator;
