use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use kubesift_k8s::{ClusterAccessor, KubeClient};
use kubesift_types::ResourceCoordinate;

mod commands;
mod config;
mod output;

use commands::Session;
use config::Config;
use output::OutputFormat;

/// Kubesift - apply manifests and select cluster resources with jq queries
#[derive(Parser, Debug)]
#[command(name = "kubesift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to <config dir>/kubesift/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Kubeconfig file
    #[arg(long, global = true, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Kubernetes context name
    #[arg(long, global = true)]
    context: Option<String>,

    /// Namespace for objects that don't set one
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// Deadline in seconds for the whole command (0 disables it)
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Output format for selected resources
    #[arg(short, long, global = true, value_enum)]
    output: Option<OutputFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create every object in a manifest
    Apply {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Look up every object in a manifest
    Get {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the first container image of every object in a collection
    Images {
        /// Use the collections of the objects in this manifest
        #[arg(short, long, conflicts_with = "resource")]
        file: Option<PathBuf>,

        /// Print every container's image, not just the first
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        target: Target,
    },

    /// List a collection and keep the objects a jq query selects
    Filter {
        /// jq expression, e.g. '.metadata.labels["app"] == "nginx"'
        query: String,

        #[command(flatten)]
        target: Target,
    },

    /// Delete every object in a manifest
    Delete {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Apply a manifest, inspect and filter it, then delete it again
    Run {
        #[arg(short, long)]
        file: PathBuf,

        /// jq expression (defaults to `query` from the config file)
        #[arg(short, long)]
        query: Option<String>,

        /// Leave the objects in the cluster
        #[arg(long)]
        keep: bool,
    },
}

/// Collection to read from
#[derive(ClapArgs, Debug, Clone)]
struct Target {
    /// API group, empty for the core group
    #[arg(long, default_value = "")]
    group: String,

    /// API version
    #[arg(long, default_value = "v1")]
    api_version: String,

    /// Plural resource name, e.g. deployments
    #[arg(long)]
    resource: Option<String>,

    /// Read across all namespaces
    #[arg(short = 'A', long)]
    all_namespaces: bool,
}

impl Target {
    fn coordinate(&self, namespace: &str) -> Result<ResourceCoordinate> {
        let Some(resource) = &self.resource else {
            anyhow::bail!("--resource is required, e.g. --resource deployments");
        };

        let coordinate = ResourceCoordinate::new(&self.group, &self.api_version, resource, namespace);
        Ok(if self.all_namespaces {
            coordinate.cluster_scoped()
        } else {
            coordinate
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };

    // Initialize tracing, RUST_LOG wins over the config file
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the command
    let result = run_app(args, config).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}

async fn run_app(args: Args, mut config: Config) -> Result<()> {
    let kubeconfig = args.kubeconfig.as_deref().or(config.kubeconfig.as_deref());
    let kube_client = KubeClient::load(kubeconfig)?;

    let context = kube_client.resolve_context(args.context.as_deref().or(config.context.as_deref()))?;
    let namespace = args
        .namespace
        .clone()
        .or_else(|| config.namespace.clone())
        .or_else(|| kube_client.context_namespace(&context).map(str::to_string))
        .unwrap_or_else(|| "default".to_string());
    tracing::debug!(%context, %namespace, "resolved target");

    let client = kube_client.client_for_context(&context).await?;

    let cancel = CancellationToken::new();
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }
    spawn_canceller(cancel.clone(), config.timeout());

    let session = Session {
        accessor: ClusterAccessor::new(client),
        namespace,
        output: args.output.unwrap_or(config.output),
        cancel: cancel.clone(),
    };

    let result = match args.command {
        Command::Apply { file } => {
            let manifest = session.load_manifest(&file)?;
            session.apply(&manifest).await
        }
        Command::Get { file } => {
            let manifest = session.load_manifest(&file)?;
            session.get(&manifest).await
        }
        Command::Images {
            file: Some(file),
            all,
            ..
        } => {
            let manifest = session.load_manifest(&file)?;
            for coordinate in manifest.collections() {
                session.images(coordinate, all).await?;
            }
            Ok(())
        }
        Command::Images {
            file: None,
            all,
            target,
        } => {
            session
                .images(&target.coordinate(&session.namespace)?, all)
                .await
        }
        Command::Filter { query, target } => {
            session
                .filter(&target.coordinate(&session.namespace)?, &query)
                .await
        }
        Command::Delete { file } => {
            let manifest = session.load_manifest(&file)?;
            session.delete(&manifest).await
        }
        Command::Run { file, query, keep } => {
            let manifest = session.load_manifest(&file)?;
            let query = query.or(config.query);
            session.run(&manifest, query.as_deref(), keep).await
        }
    };

    // Stop the deadline task
    cancel.cancel();
    result
}

/// Cancel outstanding cluster calls on deadline or Ctrl-C
fn spawn_canceller(cancel: CancellationToken, timeout: Option<Duration>) {
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = deadline => {
                tracing::warn!(?timeout, "deadline reached, cancelling");
                cancel.cancel();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_args() {
        let args = Args::try_parse_from([
            "kubesift",
            "-n",
            "shop",
            "filter",
            r#".metadata.labels["app"] == "nginx""#,
            "--group",
            "apps",
            "--resource",
            "deployments",
        ])
        .unwrap();

        assert_eq!(args.namespace.as_deref(), Some("shop"));
        match args.command {
            Command::Filter { query, target } => {
                assert_eq!(query, r#".metadata.labels["app"] == "nginx""#);
                assert_eq!(
                    target.coordinate("shop").unwrap(),
                    ResourceCoordinate::new("apps", "v1", "deployments", "shop")
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_all_namespaces_target() {
        let args = Args::try_parse_from([
            "kubesift", "images", "--resource", "pods", "-A",
        ])
        .unwrap();

        match args.command {
            Command::Images {
                file: None, target, ..
            } => {
                assert!(!target.coordinate("default").unwrap().is_namespaced())
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_run_args() {
        let args =
            Args::try_parse_from(["kubesift", "run", "-f", "my-deployment.yaml", "--keep"]).unwrap();
        match args.command {
            Command::Run { file, query, keep } => {
                assert_eq!(file, PathBuf::from("my-deployment.yaml"));
                assert!(query.is_none());
                assert!(keep);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_filter_without_resource_has_no_target() {
        let args = Args::try_parse_from(["kubesift", "filter", "true"]).unwrap();
        match args.command {
            Command::Filter { target, .. } => assert!(target.coordinate("default").is_err()),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_images_file_conflicts_with_resource() {
        let parsed = Args::try_parse_from([
            "kubesift", "images", "-f", "app.yaml", "--resource", "pods",
        ]);
        assert!(parsed.is_err());
    }
}
