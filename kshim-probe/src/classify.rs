use std::path::{Path, PathBuf};

use crate::kernel_config::ConfigValue;
use kshim_probe_macros::ExitStatus;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Outcome of a probe. Each variant is a distinct process exit status consumed by build
/// tooling; see [`Classification::exit_code`].
#[derive(Debug, ExitStatus, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The kernel provides the subsystem natively. The shim must not be built.
    #[exit(code = 0, name = "builtin")]
    Builtin,
    /// The kernel supports the subsystem but it is not built in. Fatal to the build.
    #[exit(code = 1, name = "misconfigured", fatal)]
    Misconfigured,
    /// The kernel lacks the subsystem, or only a previously installed shim header was found.
    #[exit(code = 2, name = "oot-required")]
    OotRequired,
    /// No kernel source or configuration could be located. Fatal to the build.
    #[exit(code = 3, name = "not-found", fatal)]
    NotFound,
}

impl Classification {
    /// Human-readable explanation of what the build should do
    pub fn describe(&self) -> &'static str {
        match self {
            Classification::Builtin => {
                "an in-tree implementation was found and must be used instead of the OOT version"
            }
            Classification::Misconfigured => {
                "kernel config is invalid: the subsystem is supported but not built in"
            }
            Classification::OotRequired => "the OOT compatibility shim must be built",
            Classification::NotFound => "the kernel source was not found",
        }
    }
}

/// What a classification was decided from. Exactly one source of evidence is consulted per
/// probe.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum Evidence {
    Config {
        path: PathBuf,
        value: Option<ConfigValue>,
    },
    Header {
        path: Option<PathBuf>,
        marker_found: bool,
    },
}

impl Evidence {
    pub fn classify(&self) -> Classification {
        match self {
            Evidence::Config { value, .. } => classify_config(value.as_ref()),
            Evidence::Header { path, marker_found } => {
                classify_header(path.as_deref(), *marker_found)
            }
        }
    }
}

/// A missing key means the kernel predates the subsystem; any value other than built-in
/// means it was configured out or as a module.
pub fn classify_config(value: Option<&ConfigValue>) -> Classification {
    match value {
        None => Classification::OotRequired,
        Some(value) if value.is_enabled() => Classification::Builtin,
        Some(_) => Classification::Misconfigured,
    }
}

/// The marker is only ever defined by the shim's own header, so finding it means a stale
/// shim install rather than upstream support, and the shim is rebuilt.
pub fn classify_header(header: Option<&Path>, marker_found: bool) -> Classification {
    match (header, marker_found) {
        (None, _) => Classification::OotRequired,
        (Some(_), true) => Classification::OotRequired,
        (Some(_), false) => Classification::Builtin,
    }
}
