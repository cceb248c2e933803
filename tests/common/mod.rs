// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared setup for the live-cluster tests.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;
use std::collections::BTreeMap;

/// Returns a client for the current kube context, or `None` so the caller
/// can skip when no cluster is reachable.
pub async fn get_kube_client_or_skip() -> Option<Client> {
    Client::try_default()
        .await
        .inspect_err(|e| eprintln!("Skipping: no reachable cluster ({e})"))
        .ok()
}

/// Creates `name` unless it already exists.
pub async fn create_test_namespace(client: &Client, name: &str) -> anyhow::Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                "app.kubernetes.io/managed-by".to_string(),
                "domainkeeper-integration-test".to_string(),
            )])),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    };

    match namespaces.create(&PostParams::default(), &namespace).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Deletes `name`, ignoring a namespace that is already gone.
pub async fn delete_test_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(kube::Error::Api(response)) if response.code == 404 => {}
        Err(e) => eprintln!("Failed to delete namespace {name}: {e}"),
    }
}
