// SPDX-License-Identifier: PolyForm-Shield-1.0

//! Shared bring-up helpers: tracing initialization, kept separate from
//! any one binary so every entry point in the workspace configures
//! logging the same way.

pub mod logging;

pub use logging::init_tracing;
