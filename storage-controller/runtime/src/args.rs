use crate::{
    consul::{self, ConsulConfig, ConsulStorage},
    core::{Storage, Supervisor},
    file::FileStorage,
    k8s::{self, KubeStorage},
    log,
};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};
use tracing::{error, info, warn};
use url::Url;

#[derive(Debug, Parser)]
#[clap(name = "gateway-storage", about = "Gateway configuration storage controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "gateway_storage=info,warn",
        env = "GATEWAY_STORAGE_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(subcommand)]
    backend: Backend,
}

#[derive(Debug, Subcommand)]
enum Backend {
    /// Stores resources as YAML files under a directory.
    File {
        #[clap(long)]
        root: PathBuf,

        /// Debounce window for filesystem events.
        #[clap(long, default_value = "1000")]
        sync_interval_ms: u64,
    },

    /// Stores resources in the Consul KV store.
    Consul {
        #[clap(long, default_value = consul::DEFAULT_ADDRESS)]
        address: Url,

        #[clap(long, env = "CONSUL_HTTP_TOKEN")]
        token: Option<String>,

        #[clap(long)]
        datacenter: Option<String>,

        /// Key prefix under which resources are stored.
        #[clap(long, default_value = "gloo")]
        root: String,

        /// Delay before a failed watch query is retried.
        #[clap(long, default_value = "5000")]
        sync_interval_ms: u64,
    },

    /// Stores resources as custom resources in a Kubernetes namespace.
    Kube {
        #[clap(flatten)]
        client: kubert::ClientArgs,

        #[clap(long, default_value = k8s::DEFAULT_NAMESPACE)]
        namespace: String,

        /// Upper bound on how long a watch request stays open.
        #[clap(long, default_value = "60000")]
        sync_interval_ms: u64,
    },
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            backend,
        } = self;

        log_format.try_init(log_level)?;
        let (shutdown, _) = kubert::shutdown::sigint_or_sigterm()?;

        let storage = backend.build().await?;
        storage.register().await?;

        let mut watches = Supervisor::default();
        watches.spawn(storage.upstreams().watch(vec![log::handler()])?);
        watches.spawn(storage.virtual_services().watch(vec![log::handler()])?);
        watches.spawn(storage.roles().watch(vec![log::handler()])?);
        watches.spawn(storage.attributes().watch(vec![log::handler()])?);
        watches.spawn(storage.virtual_meshes().watch(vec![log::handler()])?);
        watches.spawn(storage.files().watch(vec![log::handler()])?);
        info!(watches = watches.len(), "Running");

        let failed = tokio::select! {
            _ = shutdown.signaled() => {
                info!("Shutting down");
                None
            }
            failed = watches.next_error() => failed,
        };

        for (watcher, error) in watches.shutdown().await {
            warn!(%watcher, %error, "Watch ended with an error");
        }
        if let Some((watcher, error)) = failed {
            error!(%watcher, %error, "Watch failed");
            bail!("watch {watcher} failed: {error}");
        }
        Ok(())
    }
}

// === impl Backend ===

impl Backend {
    async fn build(self) -> Result<Box<dyn Storage>> {
        let storage: Box<dyn Storage> = match self {
            Self::File {
                root,
                sync_interval_ms,
            } => {
                info!(root = %root.display(), "Using file storage");
                Box::new(FileStorage::new(
                    root,
                    Duration::from_millis(sync_interval_ms),
                ))
            }

            Self::Consul {
                address,
                token,
                datacenter,
                root,
                sync_interval_ms,
            } => {
                info!(%address, %root, "Using consul storage");
                Box::new(ConsulStorage::new(ConsulConfig {
                    address,
                    token,
                    datacenter,
                    root,
                    sync_interval: Duration::from_millis(sync_interval_ms),
                })?)
            }

            Self::Kube {
                client,
                namespace,
                sync_interval_ms,
            } => {
                let client = client.try_client().await?;
                info!(%namespace, "Using kubernetes storage");
                Box::new(KubeStorage::new(
                    client,
                    namespace,
                    Duration::from_millis(sync_interval_ms),
                ))
            }
        };
        Ok(storage)
    }
}
