//! Background pipelines.
//!
//! A pipeline ending in `&` runs as a detached task. The evaler keeps a
//! table of them so `fg %N` can wait for one and a session can list or
//! cancel what is still running.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   BackgroundJobs                      │
//! │  jobs: BTreeMap<JobId, Entry>                         │
//! │  - spawn(text, os job, cancel, future) → JobId        │
//! │  - wait(JobId) / take(JobId) → ExecResult             │
//! │  - list() → Vec<BackgroundInfo>                       │
//! │  - cancel_all() / cleanup()                           │
//! └──────────────────────────────────────────────────────┘
//! ```

mod background;

pub use background::{BackgroundInfo, BackgroundJobs, BackgroundStatus};
