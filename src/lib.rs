//! UTM gateway: a REST service that launches a Dockerized image-analysis
//! algorithm against stored folders and tracks the resulting jobs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  UTM gateway                     │
//! │                                                  │
//! │  REST surface (axum)                             │
//! │    GET  /utm/demo            PUT /utm/demo       │
//! │    GET  /utm/example                             │
//! │    PUT  /utm/{id}/examples_folder                │
//! │    POST /utm/validate                            │
//! │    GET  /utm/job                                 │
//! │    POST /utm       POST /folder/{id}/utm         │
//! │                                                  │
//! │  jobs      submit + list workflows               │
//! │  markers   demo / example tagging                │
//! │  store     entities, ACLs, job records           │
//! │  dispatch  task descriptors -> Docker runner     │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! The REST layer never runs the algorithm itself. It builds a task
//! descriptor, hands it to a [`dispatch::Dispatcher`], and stores the job
//! handle it gets back; the runner behind the trait owns container
//! execution and walks the job's status field on its own schedule.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod markers;
pub mod store;
pub mod testing;
