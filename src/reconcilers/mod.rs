// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of `Domain` and `Cluster` resources.
//!
//! Unlike a per-object controller, domainkeeper reconciles through two paths
//! that meet in the presence cache:
//!
//! 1. **List** - A periodic full-list pass per namespace ([`validation`])
//!    updates the cache and decides which domains and clusters to make right
//! 2. **Make-right** - Each decision runs as a keyed operation ([`make_right`])
//!    made of ordered [`steps`], including a [`wait_for_ready`] suspension on
//!    the introspector job
//! 3. **Status** - Every make-right, and a per-domain timer, recomputes and
//!    persists the domain status ([`domain_status`])
//!
//! # Example: Running a List Pass
//!
//! ```rust,no_run
//! use domainkeeper::context::Context;
//! use domainkeeper::reconcilers::make_right::{DomainProcessor, MakeRightExecutor};
//! use domainkeeper::reconcilers::run_list_pass;
//! use std::sync::Arc;
//!
//! async fn resync(ctx: Arc<Context>) {
//!     let executor: Arc<dyn MakeRightExecutor> = DomainProcessor::new(ctx.clone());
//!     let summary = run_list_pass(&ctx, &executor, "apps").await;
//!     println!("{} new domains", summary.new_domains);
//! }
//! ```

pub mod domain_status;
pub mod make_right;
pub mod retry;
pub mod steps;
pub mod validation;
pub mod wait_for_ready;

pub use domain_status::{compute_new_status, recompute_domain_status, update_domain_status, StatusUpdateOutcome};
pub use make_right::DomainProcessor;
pub use validation::{run_list_pass, DomainResourcesValidation, ValidationSummary};
pub use wait_for_ready::{IntrospectorJobCheck, WaitForReadyStep};
