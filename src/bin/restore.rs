//! blob-restore CLI
//!
//! Retrieval commands against a directory-backed object store

use anyhow::{bail, Context};
use blob_restore::core::config;
use blob_restore::{
    KeyFilter, KeyPredicate, LocalDirectoryStore, RestoreConfig, Restorer, StorageLocation,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "blob-restore")]
#[command(about = "Retrieve node-scoped backup artifacts from object storage")]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Root directory of the object store (one sub-directory per bucket)
    #[arg(short = 'r', long)]
    root: Option<PathBuf>,

    /// Bucket name
    #[arg(long)]
    bucket: Option<String>,

    /// Cluster id
    #[arg(long)]
    cluster: Option<String>,

    /// Datacenter id
    #[arg(long)]
    datacenter: Option<String>,

    /// Node id
    #[arg(long)]
    node: Option<String>,

    /// Listing page size
    #[arg(long)]
    page_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Keep keys containing this substring
    #[arg(long)]
    contains: Option<String>,

    /// Keep keys ending with this suffix
    #[arg(long)]
    suffix: Option<String>,

    /// Keep keys matching this glob (`*` one segment, `**` any depth)
    #[arg(long)]
    glob: Option<String>,
}

impl FilterArgs {
    fn filters(&self) -> Vec<KeyFilter> {
        let mut filters = Vec::new();
        if let Some(s) = &self.contains {
            filters.push(KeyFilter::contains(s.as_str()));
        }
        if let Some(s) = &self.suffix {
            filters.push(KeyFilter::suffix(s.as_str()));
        }
        if let Some(s) = &self.glob {
            filters.push(KeyFilter::glob(s.as_str()));
        }
        filters
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List node-scoped objects under a prefix
    List {
        prefix: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Print the latest manifest under a prefix
    Manifest {
        prefix: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Download the single node-scoped object under a prefix into a directory
    Fetch {
        prefix: PathBuf,
        /// Destination directory
        #[arg(short, long)]
        dest: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Download one object by key
    Get {
        key: PathBuf,
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        /// Resolve the key inside the node's namespace
        #[arg(long)]
        node_aware: bool,
    },
}

fn resolve_config(cli: &Cli) -> anyhow::Result<RestoreConfig> {
    let base = match &cli.config {
        Some(path) => RestoreConfig::load(path)?,
        None => RestoreConfig::new(StorageLocation {
            bucket: String::new(),
            cluster_id: String::new(),
            datacenter_id: String::new(),
            node_id: String::new(),
        }),
    };

    // Command-line flags win over the environment, which wins over the file
    let flag = |name: &str| -> Option<String> {
        match name {
            config::ENV_BUCKET => cli.bucket.clone(),
            config::ENV_CLUSTER => cli.cluster.clone(),
            config::ENV_DATACENTER => cli.datacenter.clone(),
            config::ENV_NODE => cli.node.clone(),
            config::ENV_ROOT => cli.root.as_ref().map(|p| p.display().to_string()),
            _ => None,
        }
    };
    let mut config = base.apply_env(|name| flag(name).or_else(|| std::env::var(name).ok()))?;

    if cli.page_size.is_some() {
        config.page_size = cli.page_size;
        config.validate()?;
    }

    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli).context("invalid configuration")?;

    let Some(root) = config.local_root.clone() else {
        bail!("no store root given (use --root, BLOB_RESTORE_ROOT or local_root in the config file)");
    };

    let mut store = LocalDirectoryStore::new(&root);
    if let Some(page_size) = config.page_size {
        store = store.with_page_size(page_size);
    }

    info!(
        "Restoring from {} bucket={} node={}",
        root.display(),
        config.location.bucket,
        config.location.node_aware_prefix()
    );

    let restorer = Restorer::from_config(store, &config);

    match cli.command {
        Command::List { prefix, filter, json } => {
            let filters = filter.filters();
            let accept = |key: &str| filters.iter().all(|f| f.test(key));
            let mut failed = None;
            restorer.for_each_object(&prefix, &accept, |summary| {
                if failed.is_some() {
                    return;
                }
                if json {
                    match serde_json::to_string(&summary) {
                        Ok(line) => println!("{}", line),
                        Err(e) => failed = Some(e),
                    }
                } else {
                    println!("{}\t{}", summary.size, summary.key);
                }
            })?;
            if let Some(e) = failed {
                return Err(e).context("cannot encode listing entry");
            }
        }
        Command::Manifest { prefix, filter } => {
            let filters = filter.filters();
            let accept = |key: &str| filters.iter().all(|f| f.test(key));
            let text = restorer
                .download_manifest_to_string(&prefix, &accept)
                .with_context(|| format!("cannot read manifest under {}", prefix.display()))?;
            println!("{}", text);
        }
        Command::Fetch { prefix, dest, filter } => {
            let filters = filter.filters();
            let accept = |key: &str| filters.iter().all(|f| f.test(key));
            let path = restorer
                .download_node_file_to_dir(&dest, &prefix, &accept)
                .with_context(|| format!("cannot fetch object under {}", prefix.display()))?;
            println!("{}", path.display());
        }
        Command::Get { key, out, node_aware } => {
            let reference = if node_aware {
                restorer.object_key_to_node_aware_remote_reference(&key)
            } else {
                restorer.object_key_to_remote_reference(&key)
            };
            restorer
                .download_file(&out, &reference)
                .with_context(|| format!("cannot download {}", reference))?;
            println!("{}", out.display());
        }
    }

    Ok(())
}
