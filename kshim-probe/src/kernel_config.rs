use std::{
    fmt::Display,
    path::{Path, PathBuf},
};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::{
    fs::Filesystem,
    kernel::{is_module_tree, under_root},
};

#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

#[derive(ThisError, Debug)]
pub enum KernelConfigError {
    #[error("can't read {}: {source}", .path.display())]
    ReadFail {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Value of a kernel configuration key. `Y` is the only value meaning "built in".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Y,
    N,
    M,
    Other(String),
}

impl ConfigValue {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ConfigValue::Y)
    }

    fn from_kconfig(raw: &str) -> Self {
        match raw {
            "y" => ConfigValue::Y,
            "m" => ConfigValue::M,
            "n" => ConfigValue::N,
            _ => ConfigValue::Other(raw.to_string()),
        }
    }

    fn from_autoconf(raw: &str) -> Self {
        match raw {
            "1" => ConfigValue::Y,
            _ => ConfigValue::Other(raw.to_string()),
        }
    }
}

impl Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Y => write!(f, "y"),
            ConfigValue::N => write!(f, "n"),
            ConfigValue::M => write!(f, "m"),
            ConfigValue::Other(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(feature = "serde")]
impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Configuration files to try for a source tree, in precedence order
pub fn config_candidates(root: &Path, source: &Path) -> Vec<PathBuf> {
    vec![
        source.join("include/generated/autoconf.h"),
        source.join("include/linux/autoconf.h"),
        under_root(root, "/boot/bmlinux.autoconf.h"),
    ]
}

/// Config file for `source`, if `source` belongs to `release`'s module directory.
///
/// A tree that does not live under `/lib/modules/<release>` says nothing about the kernel
/// named by `release`, so no configuration is looked up for it at all.
pub fn locate_config(
    fs: &impl Filesystem,
    root: &Path,
    source: &Path,
    release: &str,
) -> Option<PathBuf> {
    if !is_module_tree(source, release) {
        debug!(
            "not looking for a kernel config: {} is not under /lib/modules/{}",
            source.display(),
            release
        );
        return None;
    }

    let found = config_candidates(root, source)
        .into_iter()
        .find(|candidate| fs.is_file(candidate));

    match &found {
        Some(path) => debug!("kernel config: {}", path.display()),
        None => debug!("no kernel config found under {}", source.display()),
    }
    found
}

/// Value of `key` in kernel configuration `contents`.
///
/// Understands `autoconf.h` (`#define KEY 1`, `#define KEY_MODULE 1`) and Kconfig
/// (`KEY=y`, `# KEY is not set`) lines. The first line naming `key` exactly decides; a key
/// with an empty value counts as absent.
pub fn parse_value(contents: &str, key: &str) -> Option<ConfigValue> {
    contents.lines().find_map(|line| parse_line(line.trim(), key))
}

fn parse_line(line: &str, key: &str) -> Option<ConfigValue> {
    if let Some(define) = line.strip_prefix("#define") {
        let mut tokens = define.split_whitespace();
        let name = tokens.next()?;
        let value = tokens.next()?;

        if name == key {
            return Some(ConfigValue::from_autoconf(value));
        }
        // =m options only show up as KEY_MODULE in autoconf.h
        if name.strip_suffix("_MODULE") == Some(key) && value == "1" {
            return Some(ConfigValue::M);
        }
        return None;
    }

    if let Some(unset) = line.strip_prefix('#') {
        let unset = unset.trim_start();
        return match unset.strip_prefix(key)? {
            " is not set" => Some(ConfigValue::N),
            _ => None,
        };
    }

    let (name, value) = line.split_once('=')?;
    if name.trim() != key {
        return None;
    }
    let value = value.trim().trim_matches('"');
    if value.is_empty() {
        return None;
    }
    Some(ConfigValue::from_kconfig(value))
}

/// Reads `key` out of the configuration file at `path`
pub fn read_value(
    fs: &impl Filesystem,
    path: &Path,
    key: &str,
) -> Result<Option<ConfigValue>, KernelConfigError> {
    let contents = fs
        .read_to_string(path)
        .map_err(|source| KernelConfigError::ReadFail {
            path: path.to_path_buf(),
            source,
        })?;

    let value = parse_value(&contents, key);
    debug!(
        "{}={}",
        key,
        value.as_ref().map(ToString::to_string).unwrap_or_default()
    );
    Ok(value)
}
