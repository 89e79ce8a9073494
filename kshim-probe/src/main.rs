//! Exit status tells build tooling what to do with the OOT compatibility shim:
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | kernel provides the subsystem, don't build the shim |
//! | 1 | kernel config is invalid, fail the build |
//! | 2 | build the shim |
//! | 3 | kernel source not found, fail the build |
//!
//! Invalid arguments also exit 3, so a typo can never read as "build the shim". Empty `KSRC` or
//! `BUILD_KERNEL` values count as unset.
use clap::{error::ErrorKind, Parser, ValueEnum};
use kshim_probe::{detect, Capability, Classification, DetectError, ProbeOpts, Report};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kshim-probe")]
#[command(author, version, about = "Decide whether an out-of-tree kernel compatibility shim must be built")]
struct Cli {
    /// Kernel source tree to inspect, skips the search
    #[arg(short = 'k', long, env = "KSRC")]
    ksrc: Option<String>,

    /// Kernel release to target [default: running kernel]
    #[arg(short = 'b', long, env = "BUILD_KERNEL")]
    build_kernel: Option<String>,

    /// Prefix for the well-known kernel locations, e.g. a mounted target image
    #[arg(long, env = "KSHIM_ROOT", default_value = "/")]
    root: String,

    /// Kernel config key that is built in when the kernel provides the subsystem
    #[arg(long, default_value = Capability::AUXILIARY_BUS_CONFIG_KEY)]
    config_key: String,

    /// Header file name of the subsystem
    #[arg(long, default_value = Capability::AUXILIARY_BUS_HEADER)]
    header: String,

    /// Symbol only defined by the shim's own copy of the header. Matched as a whole C
    /// identifier, so `_AUXILIARY_COMPAT_H_` does not match `_AUXILIARY_COMPAT_H_EXTRA`.
    #[arg(long, default_value = Capability::AUXILIARY_BUS_MARKER)]
    marker: String,

    /// Print the evidence report to stdout
    #[arg(long, value_enum, default_value_t = Format::None)]
    format: Format,

    /// Explain each step on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    None,
    Json,
}

impl Cli {
    fn probe_opts(&self) -> ProbeOpts {
        ProbeOpts {
            ksrc: non_empty(&self.ksrc).map(PathBuf::from),
            build_kernel: non_empty(&self.build_kernel).map(str::to_string),
            root: PathBuf::from(if self.root.is_empty() { "/" } else { &self.root }),
            capability: Capability {
                config_key: self.config_key.clone(),
                header_name: self.header.clone(),
                marker: self.marker.clone(),
            },
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "kshim_probe=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn print_json(result: &Result<Report, DetectError>) {
    let json = match result {
        Ok(report) => serde_json::to_string_pretty(report),
        Err(err) => serde_json::to_string_pretty(&serde_json::json!({
            "classification": Classification::NotFound,
            "error": err.to_string(),
        })),
    };

    match json {
        Ok(json) => println!("{}", json),
        Err(err) => error!("failed to serialize report: {}", err),
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(Classification::NotFound.exit_code());
        }
    };
    init_logging(cli.verbose);

    let result = detect(&cli.probe_opts());
    let classification = Classification::from_result(&result);

    match &result {
        Err(err) => error!("{}: {}", err, classification.describe()),
        Ok(_) if classification.is_fatal() => warn!("{}", classification.describe()),
        Ok(_) => {}
    }

    if cli.format == Format::Json {
        print_json(&result);
    }

    ExitCode::from(classification.exit_code())
}
