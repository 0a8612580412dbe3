use std::path::Path;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};

/// Kubeconfig wrapper that hands out clients per context
pub struct KubeClient {
    kubeconfig: Kubeconfig,
    current_context: Option<String>,
}

impl KubeClient {
    /// Load the kubeconfig from an explicit path, or from the default location
    /// (`$KUBECONFIG` or `~/.kube/config`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let kubeconfig = match path {
            Some(path) => Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig from {}", path.display()))?,
            None => Kubeconfig::read().context("Failed to read kubeconfig. Is kubectl configured?")?,
        };

        Ok(Self::from_kubeconfig(kubeconfig))
    }

    pub fn from_kubeconfig(kubeconfig: Kubeconfig) -> Self {
        let current_context = kubeconfig.current_context.clone();
        Self {
            kubeconfig,
            current_context,
        }
    }

    /// Names of all contexts in the kubeconfig
    pub fn contexts(&self) -> Vec<&str> {
        self.kubeconfig
            .contexts
            .iter()
            .map(|ctx| ctx.name.as_str())
            .collect()
    }

    /// Get the current context name
    pub fn current_context(&self) -> Option<&str> {
        self.current_context.as_deref()
    }

    /// Pick the requested context, falling back to the current one
    pub fn resolve_context(&self, requested: Option<&str>) -> Result<String> {
        let name = match requested {
            Some(name) => name,
            None => self
                .current_context()
                .context("No context requested and kubeconfig has no current-context")?,
        };

        let contexts = self.contexts();
        if !contexts.contains(&name) {
            anyhow::bail!(
                "Context '{}' not found in kubeconfig (available: {})",
                name,
                contexts.join(", ")
            );
        }

        Ok(name.to_string())
    }

    /// Namespace configured on a context, if any
    pub fn context_namespace(&self, context_name: &str) -> Option<&str> {
        self.kubeconfig
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .and_then(|c| c.context.as_ref())
            .and_then(|c| c.namespace.as_deref())
    }

    /// Create a kube::Client for a specific context
    pub async fn client_for_context(&self, context_name: &str) -> Result<kube::Client> {
        let config = kube::Config::from_custom_kubeconfig(
            self.kubeconfig.clone(),
            &KubeConfigOptions {
                context: Some(context_name.to_string()),
                ..Default::default()
            },
        )
        .await
        .with_context(|| format!("Failed to create config for context: {}", context_name))?;

        tracing::debug!(context = context_name, cluster = %config.cluster_url, "connecting");

        kube::Client::try_from(config)
            .with_context(|| format!("Failed to create client for context: {}", context_name))
    }
}
