// src/submit/mod.rs

//! Submission planning and dispatch.
//!
//! - `wrapper`: per-worker configuration layering.
//! - `plan`: single versus DAG and DAG rendering.
//! - `builder`: the full submission request for a stage.
//! - `driver`: runs the submission command with a deadline.
//! - `lock`: one running submission per stage.

pub mod builder;
pub mod driver;
pub mod lock;
pub mod plan;
pub mod wrapper;

pub use builder::{
    DatasetSession, PROCMAP_FILE, StagedFile, SubmissionBuilder, SubmissionOptions,
    SubmissionRequest,
};
pub use driver::{SubmissionDriver, TimeoutPolicy, parse_job_id};
pub use lock::SubmissionLock;
pub use plan::{DAG_FILE, DagPlan, SubmissionShape, decide_shape};
pub use wrapper::{WRAPPER_FCL, WrapperSection, render_wrapper, wrapper_sections};
