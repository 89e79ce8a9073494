//! `kshim-probe` decides whether a driver must be built together with an out-of-tree ("OOT")
//! compatibility shim for a kernel subsystem, or whether the target kernel already provides the
//! subsystem natively.
//!
//! The probe runs four stages in order:
//!
//! 1. resolve the kernel release being targeted ([`kernel::ResolvedTarget`]),
//! 2. locate its source/header tree ([`kernel::locate_source`]),
//! 3. locate its build configuration, but only for trees under `/lib/modules/<release>`
//!    ([`kernel_config::locate_config`]),
//! 4. classify from the configuration, or from the headers when there is none.
//!
//! The result is a [`Classification`] whose [`Classification::exit_code`] is the contract with
//! build tooling. The probe never writes anything.
//!
//! ```no_run
//! use kshim_probe::{detect, Classification, ProbeOpts};
//!
//! let classification = Classification::from_result(&detect(&ProbeOpts::default()));
//! std::process::exit(classification.exit_code().into());
//! ```
pub mod fs;
pub mod header;
pub mod kernel;
pub mod kernel_config;

mod classify;

use std::path::{Path, PathBuf};
use thiserror::Error as ThisError;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::Serialize;

pub use classify::{classify_config, classify_header, Classification, Evidence};
pub use fs::{Filesystem, HostFs};
pub use kernel::ResolvedTarget;
pub use kernel_config::{ConfigValue, KernelConfigError};

#[derive(ThisError, Debug)]
pub enum DetectError {
    #[error("unable to query the running kernel release: {0}")]
    KernelRelease(#[from] nix::errno::Errno),
    #[error("no kernel source found for {release} ({} locations searched)", .searched.len())]
    SourceNotFound {
        release: String,
        searched: Vec<PathBuf>,
    },
    #[error(
        "{}/include/linux and {}/source/include/linux do not exist",
        .0.display(),
        .0.display()
    )]
    HeadersMissing(PathBuf),
    #[error(transparent)]
    KernelConfig(#[from] KernelConfigError),
    #[error("can't read header {}: {source}", .path.display())]
    HeaderRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The kernel subsystem being probed for
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Capability {
    /// Kernel configuration key that is built in when the kernel provides the subsystem
    pub config_key: String,
    /// File name of the subsystem's public header
    pub header_name: String,
    /// Symbol only the shim's own copy of the header defines
    pub marker: String,
}

impl Capability {
    pub const AUXILIARY_BUS_CONFIG_KEY: &'static str = "CONFIG_AUXILIARY_BUS";
    pub const AUXILIARY_BUS_HEADER: &'static str = "auxiliary_bus.h";
    pub const AUXILIARY_BUS_MARKER: &'static str = "_AUXILIARY_COMPAT_H_";

    /// The auxiliary bus, merged upstream in 5.11
    pub fn auxiliary_bus() -> Self {
        Capability {
            config_key: Self::AUXILIARY_BUS_CONFIG_KEY.to_string(),
            header_name: Self::AUXILIARY_BUS_HEADER.to_string(),
            marker: Self::AUXILIARY_BUS_MARKER.to_string(),
        }
    }
}

impl Default for Capability {
    fn default() -> Self {
        Self::auxiliary_bus()
    }
}

#[derive(Debug, Clone)]
pub struct ProbeOpts {
    /// Explicit kernel source tree. Skips the source search when set.
    pub ksrc: Option<PathBuf>,
    /// Kernel release to target. Defaults to the running kernel.
    pub build_kernel: Option<String>,
    /// Prefix for the well-known search locations, for probing a mounted target filesystem
    pub root: PathBuf,
    pub capability: Capability,
}

impl Default for ProbeOpts {
    fn default() -> Self {
        Self {
            ksrc: None,
            build_kernel: None,
            root: PathBuf::from("/"),
            capability: Capability::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Report {
    pub capability: Capability,
    pub release: String,
    pub source: PathBuf,
    pub evidence: Evidence,
    pub classification: Classification,
}

impl Classification {
    /// Every probe error is a not-found outcome
    pub fn from_result(result: &Result<Report, DetectError>) -> Self {
        match result {
            Ok(report) => report.classification,
            Err(_) => Classification::NotFound,
        }
    }
}

/// Probes the host filesystem for the kernel described by `opts`
pub fn detect(opts: &ProbeOpts) -> Result<Report, DetectError> {
    detect_with(opts, &HostFs, kernel::running_release)
}

/// [`detect`] against an arbitrary filesystem and running-release source
pub fn detect_with<F, R>(opts: &ProbeOpts, fs: &F, running: R) -> Result<Report, DetectError>
where
    F: Filesystem,
    R: FnOnce() -> Result<String, DetectError>,
{
    let target = ResolvedTarget::resolve(opts, running)?;

    let source = match &target.explicit_source {
        Some(ksrc) => {
            debug!("using explicit kernel source {}", ksrc.display());
            ksrc.clone()
        }
        None => kernel::locate_source(fs, &opts.root, &target.release)?,
    };
    debug!("kernel source: {}", source.display());

    let evidence = match kernel_config::locate_config(fs, &opts.root, &source, &target.release) {
        Some(path) => {
            let value = kernel_config::read_value(fs, &path, &opts.capability.config_key)?;
            Evidence::Config { path, value }
        }
        None => inspect_headers(fs, &source, &opts.capability)?,
    };

    let classification = evidence.classify();
    info!("{}: {}", classification, classification.describe());

    Ok(Report {
        capability: opts.capability.clone(),
        release: target.release,
        source,
        evidence,
        classification,
    })
}

fn inspect_headers(
    fs: &impl Filesystem,
    source: &Path,
    capability: &Capability,
) -> Result<Evidence, DetectError> {
    if !header::has_linux_headers(fs, source) {
        return Err(DetectError::HeadersMissing(source.to_path_buf()));
    }

    let path = header::find_header(fs, source, &capability.header_name);
    let marker_found = match &path {
        Some(path) => {
            debug!("{} location: {}", capability.header_name, path.display());
            header::header_has_marker(fs, path, &capability.marker)?
        }
        None => {
            debug!("{} not found under {}", capability.header_name, source.display());
            false
        }
    };

    Ok(Evidence::Header { path, marker_found })
}
