//! CLI mode for datahub - bulk download of a collection's resources.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{CatalogClient, group_by_category};
use crate::config::{AppConfig, CatalogConfig, CONCURRENCY_LIMIT, WindowPolicy};
use crate::coordinator::{Coordinator, RunRequest};
use crate::download::Transfer;
use crate::error::{Error, Result};

use progress::{CliSink, print_resource_types, print_summary};

/// Parsed command-line arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Collection to download.
    pub collection_id: Option<String>,
    /// Destination directory.
    pub output: Option<PathBuf>,
    /// Resource type abbreviation.
    pub type_filter: Option<String>,
    /// Window width override.
    pub parallel: Option<usize>,
    /// Use the sliding window instead of batch waits.
    pub sliding: bool,
    /// Catalog server override.
    pub server: Option<String>,
    /// Explicit configuration file.
    pub config: Option<PathBuf>,
    /// Print resource types and exit.
    pub list_types: bool,
    /// Print usage and exit.
    pub help: bool,
}

impl CliArgs {
    /// Applies flag overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(n) = self.parallel {
            config.download = config.download.clone().with_concurrent_files(n);
        }
        if self.sliding {
            config.download = config.download.clone().with_window(WindowPolicy::Sliding);
        }
        if let Some(server) = &self.server {
            config.catalog.server = server.trim_end_matches('/').to_string();
        }
        if let Some(dir) = &self.output {
            config.paths.download_dir = Some(dir.clone());
        }
    }
}

fn value_for(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String> {
    args.next()
        .ok_or_else(|| Error::Config(format!("{flag} requires a value")))
}

/// Parses arguments, excluding the program name.
///
/// # Errors
///
/// Returns [`Error::Config`] for unknown options, missing values, a
/// non-numeric `--parallel` or more than one collection id.
pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--output" => parsed.output = Some(value_for(&arg, &mut args)?.into()),
            "-t" | "--type" => parsed.type_filter = Some(value_for(&arg, &mut args)?),
            "-p" | "--parallel" => {
                let value = value_for(&arg, &mut args)?;
                let n = value
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid --parallel value {value:?}")))?;
                parsed.parallel = Some(n);
            }
            "--sliding" => parsed.sliding = true,
            "--server" => parsed.server = Some(value_for(&arg, &mut args)?),
            "-c" | "--config" => parsed.config = Some(value_for(&arg, &mut args)?.into()),
            "--list-types" => parsed.list_types = true,
            "-h" | "--help" => parsed.help = true,
            positional if !positional.starts_with('-') => {
                if parsed.collection_id.is_some() {
                    return Err(Error::Config(format!("unexpected argument {positional:?}")));
                }
                parsed.collection_id = Some(positional.to_string());
            }
            unknown => return Err(Error::Config(format!("unknown option {unknown}"))),
        }
    }

    Ok(parsed)
}

/// Prints usage to stderr.
pub fn print_usage() {
    eprintln!("Usage: datahub [OPTIONS] <COLLECTION_ID>");
    eprintln!("       datahub --list-types");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <COLLECTION_ID>      DataHub collection UUID");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <DIR>   Destination directory");
    eprintln!("  -t, --type <ABBR>    Only download resources of this type");
    eprintln!(
        "  -p, --parallel <N>   Concurrent file downloads (default: {CONCURRENCY_LIMIT})"
    );
    eprintln!("      --sliding        Start a new download as soon as any one finishes");
    eprintln!("      --server <URL>   Catalog server");
    eprintln!("  -c, --config <FILE>  Configuration file");
    eprintln!("      --list-types     List resource types and exit");
    eprintln!("  -h, --help           Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DATAHUB_SERVER       Catalog server");
    eprintln!("  DATAHUB_DOWNLOAD_DIR Destination directory");
    eprintln!("  RUST_LOG             Log filter (default: warn)");
}

/// Builds the HTTP client shared by the catalog and transfers.
fn build_http_client(config: &CatalogConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

async fn list_types(catalog: &CatalogClient) -> Result<()> {
    let types = catalog.list_resource_types().await?;
    print_resource_types(&group_by_category(types));
    Ok(())
}

/// Runs the CLI with the process arguments.
///
/// # Errors
///
/// Returns an error for bad arguments or configuration, an invalid request,
/// or a failed catalog listing. Individual download failures are reported
/// in the summary only.
pub async fn run() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        print_usage();
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);
    log::debug!("Using catalog {}", config.catalog.server);

    let http = build_http_client(&config.catalog)?;
    let catalog = CatalogClient::new(http.clone(), config.catalog.server.clone());

    if args.list_types {
        return list_types(&catalog).await;
    }

    let Some(collection_id) = args.collection_id else {
        print_usage();
        return Err(Error::Config("missing collection id".to_string()));
    };

    let mut request = RunRequest::new(collection_id);
    if let Some(filter) = args.type_filter {
        request = request.with_type_filter(filter);
    }
    if let Some(dir) = config.paths.download_dir {
        request = request.with_dest_dir(dir);
    }

    let coordinator = Arc::new(Coordinator::new(
        catalog,
        Transfer::new(http),
        config.download,
    ));
    let sink = Arc::new(CliSink::new());

    let interrupt = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let closed = coordinator.cancel();
                log::warn!("Interrupted, closed {closed} open download(s)");
            }
        })
    };

    let result = coordinator.start(request, sink.clone()).await;
    interrupt.abort();
    sink.finish();

    let report = result?;
    print_summary(&report);
    coordinator.acknowledge();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_full_command_line() {
        let parsed = parse_args(args(&[
            "-o",
            "/data/tiles",
            "--type",
            "LPC",
            "-p",
            "2",
            "--sliding",
            "--server",
            "http://localhost:8000/",
            "5e6f7a8b-0f8e-3c52-7d4a-4c1e9a2b9c0d",
        ]))
        .unwrap();

        assert_eq!(parsed.output, Some(PathBuf::from("/data/tiles")));
        assert_eq!(parsed.type_filter.as_deref(), Some("LPC"));
        assert_eq!(parsed.parallel, Some(2));
        assert!(parsed.sliding);
        assert_eq!(
            parsed.collection_id.as_deref(),
            Some("5e6f7a8b-0f8e-3c52-7d4a-4c1e9a2b9c0d")
        );
    }

    #[test]
    fn empty_command_line_is_default() {
        assert_eq!(parse_args(Vec::new()).unwrap(), CliArgs::default());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert!(parse_args(args(&["-p"])).is_err());
        assert!(parse_args(args(&["-p", "four"])).is_err());
        assert!(parse_args(args(&["a", "b"])).is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = AppConfig::new();
        let parsed = parse_args(args(&[
            "-p",
            "0",
            "--sliding",
            "--server",
            "http://localhost:8000/",
            "-o",
            "out",
        ]))
        .unwrap();
        parsed.apply(&mut config);

        assert_eq!(config.download.limit(), 1);
        assert_eq!(config.download.window, WindowPolicy::Sliding);
        assert_eq!(config.catalog.server, "http://localhost:8000");
        assert_eq!(config.paths.download_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn unset_flags_keep_config() {
        let mut config = AppConfig::new();
        parse_args(Vec::new()).unwrap().apply(&mut config);
        assert_eq!(config.download.concurrent_files, CONCURRENCY_LIMIT);
        assert_eq!(config.download.window, WindowPolicy::Batch);
        assert_eq!(config.paths.download_dir, None);
    }
}
