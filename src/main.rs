// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{http::StatusCode, routing::get, Router};
use clap::Parser;
use domainkeeper::{
    config::OperatorConfig,
    constants::{METRICS_SERVER_PATH, TOKIO_WORKER_THREADS},
    context::Context,
    events::KubeEventSink,
    labels::LABEL_DOMAIN_UID,
    metrics::{gather_metrics, record_error},
    reconcilers::{make_right::MakeRightExecutor, run_list_pass, DomainProcessor},
    store::KubeResourceStore,
    topology::PodTopologyProvider,
};
use futures::{future::join_all, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    let config = OperatorConfig::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("domainkeeper")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: OperatorConfig) -> Result<()> {
    // RUST_LOG picks the level (default info), RUST_LOG_FORMAT=json switches to JSON output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!(namespaces = ?config.namespaces, "Starting domainkeeper");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    let instance = std::env::var("POD_NAME").ok();
    let ctx = Arc::new(Context::new(
        config.clone(),
        Arc::new(KubeResourceStore::new(client.clone())),
        Arc::new(KubeEventSink::new(client.clone(), instance)),
        Arc::new(PodTopologyProvider),
    ));
    let executor: Arc<dyn MakeRightExecutor> = DomainProcessor::new(ctx.clone());

    info!("Starting list passes, pod watchers and metrics server");

    // None of these should return; if one does, the process exits
    tokio::select! {
        result = run_list_passes(ctx.clone(), executor) => {
            error!("CRITICAL: list pass loop exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("List pass loop exited unexpectedly without error")
        }
        result = run_pod_watchers(client, ctx.clone()) => {
            error!("CRITICAL: pod watcher exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Pod watcher exited unexpectedly without error")
        }
        result = run_metrics_server(config.metrics_address.clone()) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping domainkeeper");
            Ok(())
        }
    }
}

/// Run a periodic full list pass for every managed namespace
async fn run_list_passes(ctx: Arc<Context>, executor: Arc<dyn MakeRightExecutor>) -> Result<()> {
    let loops = ctx
        .config
        .namespaces
        .iter()
        .map(|namespace| run_namespace_list_passes(ctx.clone(), executor.clone(), namespace.clone()));

    join_all(loops).await;
    Ok(())
}

async fn run_namespace_list_passes(ctx: Arc<Context>, executor: Arc<dyn MakeRightExecutor>, namespace: String) {
    info!(namespace = %namespace, "Starting list pass loop");
    let mut interval = tokio::time::interval(ctx.config.list_resync_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let summary = run_list_pass(&ctx, &executor, &namespace).await;
        debug!(namespace = %namespace, ?summary, "List pass finished");
    }
}

/// Forward pod updates to the wait-for-ready callbacks of each managed namespace
async fn run_pod_watchers(client: Client, ctx: Arc<Context>) -> Result<()> {
    let watchers = ctx
        .config
        .namespaces
        .iter()
        .map(|namespace| watch_pods(client.clone(), ctx.clone(), namespace.clone()));

    join_all(watchers).await;
    Ok(())
}

async fn watch_pods(client: Client, ctx: Arc<Context>, namespace: String) {
    info!(namespace = %namespace, "Starting pod watcher");
    let api: Api<Pod> = Api::namespaced(client, &namespace);
    let stream = watcher(api, watcher::Config::default().labels(LABEL_DOMAIN_UID))
        .default_backoff()
        .applied_objects();
    let mut stream = std::pin::pin!(stream);

    while let Some(event) = stream.next().await {
        match event {
            Ok(pod) => {
                let name = pod.name_any();
                let notified = ctx.pod_watches.notify(&namespace, &name, &pod);
                if notified > 0 {
                    debug!(namespace = %namespace, pod = %name, notified, "Notified pod watchers");
                }
            }
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Pod watch error");
                record_error("pod_watcher", "watch");
            }
        }
    }
    warn!(namespace = %namespace, "Pod watch stream ended");
}

/// Serve Prometheus metrics
async fn run_metrics_server(address: String) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, path = METRICS_SERVER_PATH, "Metrics server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
