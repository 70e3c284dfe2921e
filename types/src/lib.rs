//! Core types for tether.
//!
//! This crate contains the error taxonomy and the validated policy types with
//! no IO, no async, and minimal dependencies. The combinators in `tether-core`
//! and the loader in `tether-config` both build on it.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod error;
mod policy;

pub use error::{DEFAULT_TIMEOUT_MESSAGE, FlowError};
pub use policy::{
    BatchOptions, DebounceOptions, MemoOptions, PartialSuccessOptions, PolicyError,
    RateLimitPolicy, RetryAttempt, RetryPolicy, ThrottleOptions, TimeoutPolicy,
};
