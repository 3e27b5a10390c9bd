//! A Rust SDK for Flagship, a feature flagging and experimentation platform.
//!
//! # Overview
//!
//! The crate is organized as a set of building blocks around two pipelines.
//!
//! The *decision* pipeline makes campaign decisions for a visitor without talking to a
//! server on the hot path. [`bucketing::Engine`] periodically fetches the environment's
//! bucketing configuration (via [`bucketing::ApiClient`]) and stores it in a
//! [`ConfigurationStore`](configuration_store::ConfigurationStore). A call to
//! [`Engine::get_modifications`](bucketing::Engine::get_modifications) then evaluates
//! targeting rules against the visitor [`Context`] and deterministically hashes the visitor
//! into a variation bucket, so the same visitor always receives the same variation.
//!
//! The *tracking* pipeline ships analytics hits. [`hits::Hit`] values (page views, events,
//! transactions, items, and campaign activations) are handed to a
//! [`BatchHitProcessor`](batch_processor::BatchHitProcessor), which buffers them in an
//! in-memory queue and flushes them in batches through a
//! [`Dispatcher`](dispatcher::Dispatcher) to the tracking API. Flushes happen when the
//! batch size is reached, on a periodic timer, and on shutdown.
//!
//! Background threads (the configuration poller and the periodic flusher) are managed by an
//! [`ExecGroup`](exec_group::ExecGroup), which owns a shutdown signal and joins every
//! thread on termination.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! In production, it is recommended to ignore all errors, as feature flag evaluation should
//! not be critical enough to cause system crashes. However, the returned errors are
//! valuable for debugging and usually indicate that developer's attention is needed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages. Consider integrating a `log`-compatible logger implementation for better
//! visibility into SDK operations.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod batch_processor;
pub mod bucketing;
pub mod configuration_store;
pub mod decision;
pub mod dispatcher;
pub mod exec_group;
pub mod hit_queue;
pub mod hits;
pub mod tracking_api;

mod context;
mod error;

pub use context::{Context, ContextValue};
pub use error::{Error, Result};
