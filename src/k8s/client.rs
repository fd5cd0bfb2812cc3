use anyhow::{Context, Result};
use kube::{Client, Config};

use crate::k8s::pod::PodExecutor;

pub struct K8sClient {
    client: Client,
    default_namespace: String,
}

impl K8sClient {
    /// Connect using the ambient kubeconfig or in-cluster service account.
    pub async fn new() -> Result<Self> {
        let config = Config::infer()
            .await
            .context("Failed to load Kubernetes configuration")?;
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;

        Ok(Self {
            client,
            default_namespace,
        })
    }

    /// Namespace from the active kubeconfig context.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn executor(&self) -> PodExecutor {
        PodExecutor::new(self.client.clone())
    }
}
