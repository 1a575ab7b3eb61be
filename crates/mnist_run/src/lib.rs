//! MNIST training run driver.
//!
//! Trains, resumes, or reuses a classifier depending on the checkpoint
//! already stored for the current source revision, then evaluates it and
//! uploads the checkpoint and metrics under that revision.

mod device;
pub mod driver;
pub mod framework;
pub mod metrics;

pub use device::{TrainBackend, init_device};
pub use driver::{ResumeDecision, RunReport, run};
pub use framework::{BurnFramework, LoadedState, ModelState, TrainingFramework};
pub use metrics::MetricsDocument;
