use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::model::ListOutcome;

/// Enumerates cluster resources for one kubeconfig file.
pub trait ClusterLister: Clone + Send + Sync + 'static {
    fn list_namespaces(&self, kubeconfig: &Path)
    -> impl Future<Output = Result<Vec<String>>> + Send;

    fn list_pods(
        &self,
        kubeconfig: &Path,
        namespace: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Lightweight handshake used to tell an empty cluster from an unreachable one.
    fn check_reachable(&self, kubeconfig: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Lister backed by a kube client built from the selected kubeconfig file.
#[derive(Debug, Clone)]
pub struct KubeLister {
    request_timeout: Duration,
}

impl KubeLister {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    async fn client(&self, kubeconfig: &Path) -> Result<Client> {
        let parsed = Kubeconfig::read_from(kubeconfig)
            .with_context(|| format!("failed to read kubeconfig {}", kubeconfig.display()))?;
        let config = Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
            .await
            .context("failed to infer Kubernetes configuration")?;
        Client::try_from(config).context("failed to initialize Kubernetes client")
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("{what} timed out after {:?}", self.request_timeout),
        }
    }
}

impl ClusterLister for KubeLister {
    async fn list_namespaces(&self, kubeconfig: &Path) -> Result<Vec<String>> {
        self.bounded("namespace listing", async {
            let client = self.client(kubeconfig).await?;
            let api: Api<Namespace> = Api::all(client);
            let list = api
                .list(&ListParams::default())
                .await
                .context("failed to list namespaces")?;
            Ok(sorted_names(list.into_iter().map(|item| item.name_any())))
        })
        .await
    }

    async fn list_pods(&self, kubeconfig: &Path, namespace: &str) -> Result<Vec<String>> {
        self.bounded("pod listing", async {
            let client = self.client(kubeconfig).await?;
            let api: Api<Pod> = Api::namespaced(client, namespace);
            let list = api
                .list(&ListParams::default())
                .await
                .with_context(|| format!("failed to list pods in {namespace}"))?;
            Ok(sorted_names(list.into_iter().map(|item| item.name_any())))
        })
        .await
    }

    async fn check_reachable(&self, kubeconfig: &Path) -> Result<()> {
        self.bounded("cluster version check", async {
            let client = self.client(kubeconfig).await?;
            let info = client
                .apiserver_version()
                .await
                .context("cluster version check failed")?;
            debug!("cluster reachable: {}", info.git_version);
            Ok(())
        })
        .await
    }
}

fn sorted_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut names = names.filter(|name| !name.is_empty()).collect::<Vec<_>>();
    names.sort();
    names
}

/// Lists namespaces and classifies an empty answer with a reachability check.
pub async fn load_namespaces<L: ClusterLister>(lister: &L, kubeconfig: &Path) -> ListOutcome {
    let primary = lister.list_namespaces(kubeconfig).await;
    classify(lister, kubeconfig, "namespaces", primary).await
}

pub async fn load_pods<L: ClusterLister>(
    lister: &L,
    kubeconfig: &Path,
    namespace: &str,
) -> ListOutcome {
    let primary = lister.list_pods(kubeconfig, namespace).await;
    classify(lister, kubeconfig, "pods", primary).await
}

async fn classify<L: ClusterLister>(
    lister: &L,
    kubeconfig: &Path,
    kind: &str,
    primary: Result<Vec<String>>,
) -> ListOutcome {
    let primary_error = match primary {
        Ok(names) if !names.is_empty() => return ListOutcome::Listed(names),
        Ok(_) => None,
        Err(error) => {
            warn!("listing {kind} failed: {error:#}");
            Some(error)
        }
    };

    match lister.check_reachable(kubeconfig).await {
        Ok(()) => {
            if primary_error.is_some() {
                debug!("cluster answered the version check, treating {kind} as empty");
            }
            ListOutcome::EmptyButReachable
        }
        Err(reach_error) => {
            let detail = match primary_error {
                Some(error) => format!("{error:#}"),
                None => format!("{reach_error:#}"),
            };
            warn!("cluster unreachable while listing {kind}: {reach_error:#}");
            ListOutcome::Unreachable(detail)
        }
    }
}
