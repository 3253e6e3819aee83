//! Templating agent subsystem.
//!
//! # Data Flow
//! ```text
//! scheduler.rs (per tick or per job loop)
//!     → pipeline.rs
//!         → fetch (shuffled endpoints, hash echo)
//!         → checks.rs (document checks)
//!         → render.rs (handlebars)
//!         → writer.rs (hash diff, staging write)
//!         → reload.rs (validate → promote → reload)
//!     → outcome.rs (code 0/1/3/4, metrics, telemetry line)
//! ```

pub mod checks;
pub mod job;
pub mod outcome;
pub mod pipeline;
pub mod reload;
pub mod render;
pub mod scheduler;
pub mod template_check;
pub mod writer;

pub use job::Job;
pub use outcome::JobOutcome;
pub use pipeline::{run_job, AgentContext};
pub use render::{HandlebarsRenderer, RenderedArtifact, TemplateRenderer};
pub use scheduler::{JobSet, Scheduler};
