//! # CRD Generator
//!
//! Generates Kubernetes CustomResourceDefinition (CRD) YAML from Rust type definitions.
//!
//! This binary uses the `kube` crate's `CustomResourceExt` trait to generate
//! the CRDs of every kind the operator manages.
//!
//! ## Usage
//!
//! ```bash
//! # Generate all CRDs
//! cargo run --bin crdgen > config/crd/microcks.yaml
//!
//! # Generate a single CRD
//! cargo run --bin crdgen -- --kind test
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kube::core::CustomResourceExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use microcks_operator::crd::{APISource, Microcks, SecretSource, Test};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Microcks,
    ApiSource,
    SecretSource,
    Test,
}

impl Kind {
    fn crd(self) -> CustomResourceDefinition {
        match self {
            Kind::Microcks => Microcks::crd(),
            Kind::ApiSource => APISource::crd(),
            Kind::SecretSource => SecretSource::crd(),
            Kind::Test => Test::crd(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "crdgen", about = "Print the CRDs of the Microcks operator as YAML")]
struct Args {
    /// Only print these kinds (repeatable); all kinds by default
    #[arg(long, value_enum)]
    kind: Vec<Kind>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let kinds = if args.kind.is_empty() {
        Kind::value_variants().to_vec()
    } else {
        args.kind
    };

    let documents = kinds
        .into_iter()
        .map(|kind| {
            serde_yaml::to_string(&kind.crd())
                .with_context(|| format!("Failed to serialize {kind:?} CRD to YAML"))
        })
        .collect::<Result<Vec<_>>>()?;

    print!("{}", documents.join("---\n"));
    Ok(())
}
