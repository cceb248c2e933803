// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Writes the `Domain` and `Cluster` CRD manifests derived from src/crd.rs.
//!
//!   cargo run --bin crdgen [-- --output-dir deploy/crds]

use clap::Parser;
use domainkeeper::constants::CONTROLLER_NAME;
use domainkeeper::crd::{Cluster, Domain};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# Generated by `cargo run --bin crdgen` from src/crd.rs; edits are overwritten.
";

#[derive(Parser, Debug)]
#[command(name = "crdgen", about = "Generate domainkeeper CRD manifests")]
struct Args {
    /// Directory the manifests are written to
    #[arg(long, default_value = "deploy/crds")]
    output_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    fs::create_dir_all(&args.output_dir)?;

    let manifests = [
        ("domains.crd.yaml", Domain::crd()),
        ("clusters.crd.yaml", Cluster::crd()),
    ];
    for (filename, crd) in manifests {
        let path = write_manifest(&args.output_dir, filename, &crd)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn write_manifest(dir: &Path, filename: &str, crd: &CustomResourceDefinition) -> anyhow::Result<PathBuf> {
    let mut manifest = serde_json::to_value(crd)?;
    decorate(&mut manifest);

    let path = dir.join(filename);
    fs::write(&path, format!("{MANIFEST_HEADER}{}", serde_yaml::to_string(&manifest)?))?;
    Ok(path)
}

/// Groups both kinds under one `kubectl get` category and enables the
/// status subresource on every served version.
fn decorate(manifest: &mut Value) {
    manifest["spec"]["names"]["categories"] = json!([CONTROLLER_NAME]);
    if let Some(versions) = manifest["spec"]["versions"].as_array_mut() {
        for version in versions {
            version["subresources"]["status"] = json!({});
        }
    }
}
