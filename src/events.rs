// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes events emitted for domains and clusters.
//!
//! An [`EventData`] names *what* happened ([`EventItem`]) and *to whom*. It is
//! attached to make-right operations and produced by the status diff, then
//! handed to an [`EventSink`]. [`KubeEventSink`] publishes through the
//! `kube` event recorder.

use crate::api_errors::StoreError;
use crate::constants::{API_GROUP_VERSION, CONTROLLER_NAME, KIND_CLUSTER, KIND_DOMAIN};
use crate::crd::DomainFailureReason;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::debug;

/// Kinds of events the operator emits.
///
/// The declaration order is the emission order when several events come out
/// of one status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventItem {
    DomainCreated,
    DomainChanged,
    DomainDeleted,
    DomainFailureResolved,
    DomainAvailable,
    DomainUnavailable,
    DomainCompleted,
    DomainIncomplete,
    DomainFailed,
    ClusterCreated,
    ClusterChanged,
    ClusterDeleted,
}

impl EventItem {
    /// Event reason as shown by `kubectl get events`.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            EventItem::DomainCreated => "DomainCreated",
            EventItem::DomainChanged => "DomainChanged",
            EventItem::DomainDeleted => "DomainDeleted",
            EventItem::DomainFailureResolved => "DomainFailureResolved",
            EventItem::DomainAvailable => "DomainAvailable",
            EventItem::DomainUnavailable => "DomainUnavailable",
            EventItem::DomainCompleted => "DomainCompleted",
            EventItem::DomainIncomplete => "DomainIncomplete",
            EventItem::DomainFailed => "DomainFailed",
            EventItem::ClusterCreated => "ClusterCreated",
            EventItem::ClusterChanged => "ClusterChanged",
            EventItem::ClusterDeleted => "ClusterDeleted",
        }
    }

    /// Returns the item whose [`reason`](Self::reason) matches, if any.
    #[must_use]
    pub fn from_reason(reason: &str) -> Option<Self> {
        ALL_ITEMS.iter().copied().find(|item| item.reason() == reason)
    }

    /// `true` for items that report a problem.
    #[must_use]
    pub fn is_warning(self) -> bool {
        matches!(
            self,
            EventItem::DomainFailed | EventItem::DomainUnavailable | EventItem::DomainIncomplete
        )
    }

    /// `true` for items about a `Cluster` resource.
    #[must_use]
    pub fn is_cluster_event(self) -> bool {
        matches!(
            self,
            EventItem::ClusterCreated | EventItem::ClusterChanged | EventItem::ClusterDeleted
        )
    }

    /// Action recorded on the Kubernetes event.
    #[must_use]
    pub fn action(self) -> &'static str {
        match self {
            EventItem::DomainCreated | EventItem::ClusterCreated => "Create",
            EventItem::DomainChanged | EventItem::ClusterChanged => "Update",
            EventItem::DomainDeleted | EventItem::ClusterDeleted => "Delete",
            _ => "Reconcile",
        }
    }

    fn default_message(self, name: &str) -> String {
        match self {
            EventItem::DomainCreated => format!("Domain resource {name} was created"),
            EventItem::DomainChanged => format!("Domain resource {name} was changed"),
            EventItem::DomainDeleted => format!("Domain resource {name} was deleted"),
            EventItem::DomainFailureResolved => format!("Domain {name} failure has been resolved"),
            EventItem::DomainAvailable => format!("Domain {name} is available"),
            EventItem::DomainUnavailable => format!("Domain {name} is unavailable"),
            EventItem::DomainCompleted => format!("Domain {name} is complete"),
            EventItem::DomainIncomplete => format!("Domain {name} is incomplete"),
            EventItem::DomainFailed => format!("Domain {name} failed"),
            EventItem::ClusterCreated => format!("Cluster resource {name} was created"),
            EventItem::ClusterChanged => format!("Cluster resource {name} was changed"),
            EventItem::ClusterDeleted => format!("Cluster resource {name} was deleted"),
        }
    }
}

const ALL_ITEMS: [EventItem; 12] = [
    EventItem::DomainCreated,
    EventItem::DomainChanged,
    EventItem::DomainDeleted,
    EventItem::DomainFailureResolved,
    EventItem::DomainAvailable,
    EventItem::DomainUnavailable,
    EventItem::DomainCompleted,
    EventItem::DomainIncomplete,
    EventItem::DomainFailed,
    EventItem::ClusterCreated,
    EventItem::ClusterChanged,
    EventItem::ClusterDeleted,
];

/// One event to emit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventData {
    pub item: EventItem,
    pub message: Option<String>,
    pub failure_reason: Option<DomainFailureReason>,
    pub namespace: Option<String>,
    /// Name of the involved `Domain` or `Cluster` resource.
    pub resource_name: Option<String>,
    pub domain_uid: Option<String>,
}

impl EventData {
    #[must_use]
    pub fn new(item: EventItem) -> Self {
        Self {
            item,
            message: None,
            failure_reason: None,
            namespace: None,
            resource_name: None,
            domain_uid: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_failure_reason(mut self, reason: DomainFailureReason) -> Self {
        self.failure_reason = Some(reason);
        self
    }

    /// Fills in the involved resource coordinates that are still unset.
    #[must_use]
    pub fn with_resource(mut self, namespace: &str, resource_name: &str) -> Self {
        self.namespace.get_or_insert_with(|| namespace.to_string());
        self.resource_name
            .get_or_insert_with(|| resource_name.to_string());
        self
    }

    #[must_use]
    pub fn with_domain_uid(mut self, domain_uid: &str) -> Self {
        self.domain_uid.get_or_insert_with(|| domain_uid.to_string());
        self
    }

    /// Text of the event note: the explicit message or the item's default.
    #[must_use]
    pub fn note(&self) -> String {
        let name = self.resource_name.as_deref().unwrap_or("<unknown>");
        let base = self
            .message
            .clone()
            .unwrap_or_else(|| self.item.default_message(name));
        match self.failure_reason {
            Some(reason) if self.message.is_some() => format!("{base} (reason: {reason:?})"),
            _ => base,
        }
    }
}

/// Accepts events for publication.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be recorded.
    async fn emit(&self, event: &EventData) -> Result<(), StoreError>;
}

/// Publishes events through the Kubernetes events API.
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    /// Creates a sink reporting as this controller. `instance` is usually the pod name.
    #[must_use]
    pub fn new(client: Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

fn involved_object(event: &EventData) -> ObjectReference {
    let kind = if event.item.is_cluster_event() {
        KIND_CLUSTER
    } else {
        KIND_DOMAIN
    };
    ObjectReference {
        api_version: Some(API_GROUP_VERSION.to_string()),
        kind: Some(kind.to_string()),
        name: event.resource_name.clone(),
        namespace: event.namespace.clone(),
        ..Default::default()
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn emit(&self, event: &EventData) -> Result<(), StoreError> {
        let operation = format!("record event {}", event.item.reason());
        let reference = involved_object(event);
        let kube_event = Event {
            type_: if event.item.is_warning() {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: event.item.reason().to_string(),
            note: Some(event.note()),
            action: event.item.action().to_string(),
            secondary: None,
        };

        self.recorder
            .publish(&kube_event, &reference)
            .await
            .map_err(|e| StoreError::from_kube(&operation, &e))?;

        debug!(
            reason = event.item.reason(),
            namespace = ?event.namespace,
            name = ?event.resource_name,
            "Recorded event"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod events_tests;
