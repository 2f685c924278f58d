#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod builder;
pub mod config;
mod engine;
mod error;
mod io;
pub mod logging;
pub mod pipeline;
#[cfg(feature = "live")]
pub mod watch;

use std::future::Future;
use std::pin::Pin;

/// Owned, sendable future used at the type-erased seams of the crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use crate::builder::{Bundler, Esbuild, ScriptBuilder, StyleBuilder};
pub use crate::config::Config;
pub use crate::engine::{
    Action, Diagnostics, Runner, TaskDef, TaskExecution, TaskGraph, TaskResult, action,
};
pub use crate::error::*;
pub use crate::pipeline::Pipeline;
#[cfg(feature = "live")]
pub use crate::watch::{GroupState, WatchBinding, WatchCoordinator};
