// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Authscope: bulk auditor for website login entry points and third-party
//! OAuth providers.
//!
//! For every site in a list, a browser session dismisses any consent banner,
//! discovers login affordances, classifies how the credential form is
//! presented (popup, redirect, modal), and infers which identity providers
//! the page references from its markup, content and network traffic.

pub mod affordance;
pub mod analyzer;
pub mod audit;
pub mod batch;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod consent;
pub mod error;
pub mod model;
pub mod oauth;
pub mod probe;
pub mod progress;
pub mod renderer;
pub mod report;

pub use analyzer::SiteAnalyzer;
pub use batch::{BatchRunner, RunSummary};
pub use error::{ProbeError, ProbeResult};
pub use model::SiteResult;
