//! Reelforge - declarative render job pipeline
//!
//! Callers submit a render specification, a scheduler dispatches it to one of
//! three engines (vector infographic, scripted motion, component composition)
//! and the finished artifact path is polled from the job queue.

pub mod anim;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod harness;
pub mod job;
pub mod scheduler;
pub mod spec;
pub mod theme;
pub mod video;
pub mod workspace;

// Re-export main types for easy access
pub use crate::audio::{AudioAnalyzer, SilenceInterval, SilenceMarkerSet};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::engine::{EngineRegistry, RenderEngine, RenderResult};
pub use crate::error::{RenderError, Result};
pub use crate::harness::browser::{BrowserLauncher, ChromiumLauncher};
pub use crate::job::{JobQueue, JobStatus, JobStatusView, RenderJob};
pub use crate::scheduler::{Scheduler, SchedulerHandle};
pub use crate::spec::{RenderSpec, SubmitRequest};
pub use crate::theme::Palette;
