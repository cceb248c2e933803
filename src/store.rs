// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read/replace access to the resources the operator reconciles.
//!
//! [`ResourceStore`] is the only path to the API server used by the
//! reconciliation core. [`KubeResourceStore`] implements it over `kube::Api`,
//! retrying transient failures on reads. Status replaces are not retried here:
//! the status updater re-reads and recomputes on every recoverable failure.

use crate::api_errors::StoreError;
use crate::constants::KIND_DOMAIN;
use crate::crd::{Cluster, Domain};
use crate::labels::LABEL_DOMAIN_UID;
use crate::reconcilers::retry::retry_api_call;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Pod, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Async access to pods, services, disruption budgets, domains, clusters and events.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Lists operator-managed pods (server pods and introspector job pods).
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, StoreError>;

    /// Lists operator-managed services.
    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, StoreError>;

    /// Lists operator-managed pod disruption budgets.
    async fn list_pod_disruption_budgets(
        &self,
        namespace: &str,
    ) -> Result<Vec<PodDisruptionBudget>, StoreError>;

    async fn list_domains(&self, namespace: &str) -> Result<Vec<Domain>, StoreError>;

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<Cluster>, StoreError>;

    /// Lists events whose involved object is a `Domain`.
    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>, StoreError>;

    async fn get_domain(&self, namespace: &str, name: &str) -> Result<Option<Domain>, StoreError>;

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError>;

    /// Replaces the status of `domain`, guarded by its resource version.
    ///
    /// Returns the object as stored by the server.
    async fn replace_domain_status(&self, domain: &Domain) -> Result<Domain, StoreError>;

    /// Replaces the status of `cluster`, guarded by its resource version.
    async fn replace_cluster_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError>;
}

/// [`ResourceStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list<K>(&self, namespace: &str, params: ListParams, kind: &str) -> Result<Vec<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let operation = format!("list {kind} in {namespace}");
        let list = retry_api_call(|| api.list(&params), &operation).await?;
        debug!(namespace = %namespace, kind = kind, count = list.items.len(), "Listed resources");
        Ok(list.items)
    }

    async fn get<K>(&self, namespace: &str, name: &str, kind: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let operation = format!("get {kind} {namespace}/{name}");
        retry_api_call(|| api.get_opt(name), &operation).await
    }

    /// PUTs the whole object to the status subresource. The server applies
    /// the status only if `metadata.resourceVersion` still matches, and fields
    /// missing from the body are cleared.
    async fn replace_status<K>(&self, resource: &K, kind: &str) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        let operation = format!("replace status of {kind} {namespace}/{name}");
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        api.replace_status(&name, &PostParams::default(), resource)
            .await
            .map_err(|e| StoreError::from_kube(&operation, &e))
    }
}

fn managed_resources() -> ListParams {
    ListParams::default().labels(LABEL_DOMAIN_UID)
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, StoreError> {
        self.list(namespace, managed_resources(), "pods").await
    }

    async fn list_services(&self, namespace: &str) -> Result<Vec<Service>, StoreError> {
        self.list(namespace, managed_resources(), "services").await
    }

    async fn list_pod_disruption_budgets(
        &self,
        namespace: &str,
    ) -> Result<Vec<PodDisruptionBudget>, StoreError> {
        self.list(namespace, managed_resources(), "poddisruptionbudgets")
            .await
    }

    async fn list_domains(&self, namespace: &str) -> Result<Vec<Domain>, StoreError> {
        self.list(namespace, ListParams::default(), "domains").await
    }

    async fn list_clusters(&self, namespace: &str) -> Result<Vec<Cluster>, StoreError> {
        self.list(namespace, ListParams::default(), "clusters").await
    }

    async fn list_events(&self, namespace: &str) -> Result<Vec<Event>, StoreError> {
        let params =
            ListParams::default().fields(&format!("involvedObject.kind={KIND_DOMAIN}"));
        self.list(namespace, params, "events").await
    }

    async fn get_domain(&self, namespace: &str, name: &str) -> Result<Option<Domain>, StoreError> {
        self.get(namespace, name, "domain").await
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError> {
        self.get(namespace, name, "cluster").await
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        self.get(namespace, name, "pod").await
    }

    async fn replace_domain_status(&self, domain: &Domain) -> Result<Domain, StoreError> {
        self.replace_status(domain, "domain").await
    }

    async fn replace_cluster_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        self.replace_status(cluster, "cluster").await
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
