//! Kf Client - generic resource clients for Kf
//!
//! This crate provides:
//! - **Core Client**: CRUD, conflict-retrying transforms and create-or-merge upserts for any kind
//! - **Stores**: A Kubernetes API server backend and an in-memory mock with version tokens
//! - **Kind Adapters**: Membership checks and write preprocessing per kind
//! - **Waits**: Condition polling with deadlines, cancellation and progress reporting
//! - **Diffs**: Report what a mutation changed
//! - **Functional Helpers**: Composable predicates, mutators and status readers

pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod functional;
pub mod kind;
pub mod kinds;
pub mod options;
pub mod progress;
pub mod store;
pub mod wait;

pub use client::{CONDITION_READY, CoreClient};
pub use config::{ClientConfig, RetryPolicy, UpsertLookup};
pub use diff::{diff_objects, diff_wrapper, format_diff};
pub use error::{ClientError, Result};
pub use functional::{
    Condition, Mutator, MutatorList, Object, Predicate, extract_conditions, filter,
    label_equals_predicate, label_set_mutator, labels_contains_predicate,
    observed_generation_matches, replace,
};
pub use kind::{Kind, ResourceInfo, ResourceKind};
pub use options::{DeleteOptions, ListOptions};
pub use progress::{WaitProgress, report_to};
pub use store::{KubeStore, MockStore, Operation, OperationCounts, Store, UpdateHook};
pub use wait::{
    CancelHandle, Check, ConditionReporter, Fetched, WaitContext, condition_deleted,
    condition_true, wrap_predicate,
};
