//! ddbmetrics Test Utilities
//!
//! In-process doubles for the collector's collaborators.
//!
//! - [`ScriptedMetricsApi`]: deterministic paginated `GetMetricData` answers,
//!   with failure and latency injection
//! - [`FlakyMetricStore`]: a memory store whose upserts can be made to fail
//! - [`fixtures`]: resources, metric configs, windows and temp checkpoint stores
//!
//! # Usage
//!
//! ```rust,ignore
//! use ddbmetrics_test_utils::{fixtures, ScriptedMetricsApi};
//!
//! #[tokio::test]
//! async fn test_collects() {
//!     let (_dir, checkpoints) = fixtures::temp_checkpoint_store();
//!     let api = Arc::new(ScriptedMetricsApi::new());
//!     // ...
//! }
//! ```

pub mod api;
pub mod fixtures;
pub mod store;

pub use api::ScriptedMetricsApi;
pub use store::FlakyMetricStore;
