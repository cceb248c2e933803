// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared types and imports for domain status computation.

#![allow(clippy::wildcard_imports)]

pub use crate::constants::{SERVER_STATE_RUNNING, SERVER_STATE_SHUTDOWN};
pub use crate::context::Context;
pub use crate::crd::{
    ClusterStatus, ConditionStatus, Domain, DomainCondition, DomainConditionType,
    DomainFailureReason, DomainStatus, FailureSeverity, ServerHealth, ServerStatus,
};
pub use crate::events::{EventData, EventItem};
pub use crate::presence::{DomainPresenceInfo, ServerStartupInfo};
pub use crate::topology::{DomainTopology, ReconcileInputs};

pub use std::collections::{BTreeMap, BTreeSet};
pub use std::sync::Arc;
pub use tracing::{debug, info, warn};
