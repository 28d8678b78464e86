//! fleetroll rolling deployments: push a new machine image through a
//! managed fleet group.
//!
//! The orchestrator decides whether the group needs an update at all,
//! publishes a new launch configuration version when the image changed,
//! applies the new capacity, drives a rolling instance refresh to a
//! terminal state, and then reaps instances that never reached service.
//!
//! # Components
//!
//! - **`retry`**: Exponential-backoff retry policy for control-plane calls
//! - **`control_plane`**: `ControlPlane` trait and the retrying `FleetClient`
//! - **`decision`**: Idempotency check (image id + desired/min/max)
//! - **`versioner`**: Launch configuration versioning and group update
//! - **`refresh`**: Rolling refresh start and poll-until-terminal
//! - **`reaper`**: Terminate instances that are not `InService`
//! - **`orchestrator`**: Sequences the stages, fail-fast
//! - **`sim`**: In-memory control plane for tests and dry runs
//!
//! # Flow
//!
//! ```text
//! describe_group ─► decide ─┬─ NoUpdate ─► done
//!                           └─ Update ──► version + update_group
//!                                          ─► start_refresh ─► poll
//!                                          ─► reap stale ─► done
//! ```

pub mod control_plane;
pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod reaper;
pub mod refresh;
pub mod retry;
pub mod sim;
pub mod sleep;
pub mod versioner;

pub use control_plane::{ControlPlane, FleetClient};
pub use decision::{UpdateDecision, UpdateDecisionEngine};
pub use error::{DeployError, DeployResult};
pub use orchestrator::{DeploymentOrchestrator, DeploymentOutcome};
pub use reaper::{ReapPass, StaleInstanceReaper};
pub use refresh::{PollAction, RefreshController, RefreshTracker};
pub use retry::{RetryConfig, RetryPolicy, Retryable};
pub use sim::{FleetFixture, InMemoryControlPlane, Operation};
pub use sleep::{RecordingSleeper, Sleeper, TokioSleeper};
pub use versioner::LaunchConfigVersioner;
