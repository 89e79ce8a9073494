//! Resolving which kernel is being probed and where its headers live
use nix::sys::utsname;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::{fs::Filesystem, DetectError, ProbeOpts};

/// Headers subtree every supported kernel source/header tree carries
pub const LINUX_INCLUDE_DIR: &str = "include/linux";

/// Release string of the running kernel, as reported by `uname -r`
pub fn running_release() -> Result<String, DetectError> {
    let utsn = utsname::uname()?;
    Ok(utsn.release().to_string_lossy().into_owned())
}

/// Caller input with precedence applied once up front.
///
/// `release` is always set: either the caller's explicit identity or the running kernel's.
/// `explicit_source`, when present, wins over any release-driven search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub release: String,
    pub explicit_source: Option<PathBuf>,
}

impl ResolvedTarget {
    /// `running` is only invoked when the caller did not name a kernel release
    pub fn resolve<F>(opts: &ProbeOpts, running: F) -> Result<Self, DetectError>
    where
        F: FnOnce() -> Result<String, DetectError>,
    {
        let release = match &opts.build_kernel {
            Some(release) => release.clone(),
            None => {
                let release = running()?;
                debug!("using running kernel release {}", release);
                release
            }
        };

        Ok(ResolvedTarget {
            release,
            explicit_source: opts.ksrc.clone(),
        })
    }
}

/// Joins an absolute, well-known location onto the probe root
pub(crate) fn under_root(root: &Path, absolute: impl AsRef<Path>) -> PathBuf {
    let relative: PathBuf = absolute
        .as_ref()
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}

/// Portion of the release before the first `-`, i.e. without distro build metadata
fn release_base(release: &str) -> &str {
    release.split('-').next().unwrap_or(release)
}

/// `major.minor` of a `major.minor.patch...` release. Releases without a third component
/// come back unchanged.
fn release_major_minor(release: &str) -> &str {
    let mut dots = release.match_indices('.').map(|(idx, _)| idx);
    match (dots.next(), dots.next()) {
        (Some(_), Some(second)) => &release[..second],
        _ => release,
    }
}

/// Source tree locations to try, in precedence order
pub fn source_candidates(root: &Path, release: &str) -> Vec<PathBuf> {
    [
        format!("/lib/modules/{}/source", release),
        format!("/lib/modules/{}/build", release),
        format!("/usr/src/linux-{}", release),
        format!("/usr/src/linux-{}", release_base(release)),
        format!("/usr/src/kernel-headers-{}", release),
        format!("/usr/src/kernel-source-{}", release),
        format!("/usr/src/linux-{}", release_major_minor(release)),
        "/usr/src/linux".to_string(),
        format!("/usr/src/kernels/{}", release),
        "/usr/src/kernels".to_string(),
    ]
    .into_iter()
    .map(|candidate| under_root(root, candidate))
    .collect()
}

/// First candidate accepted by `exists`. Later candidates are never inspected once one matches.
pub fn first_match<I, F>(candidates: I, mut exists: F) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
    F: FnMut(&Path) -> bool,
{
    candidates.into_iter().find(|candidate| exists(candidate))
}

/// Finds the source tree for `release` among [`source_candidates`]
pub fn locate_source(
    fs: &impl Filesystem,
    root: &Path,
    release: &str,
) -> Result<PathBuf, DetectError> {
    let candidates = source_candidates(root, release);

    first_match(candidates.iter().cloned(), |dir| {
        let found = fs.is_dir(&dir.join(LINUX_INCLUDE_DIR));
        debug!("checking {}: {}", dir.display(), if found { "found" } else { "absent" });
        found
    })
    .ok_or(DetectError::SourceNotFound {
        release: release.to_string(),
        searched: candidates,
    })
}

/// Whether `source` sits under the conventional `/lib/modules/<release>` directory, i.e. it
/// was derived from `release` rather than pointing at an unrelated custom tree.
pub fn is_module_tree(source: &Path, release: &str) -> bool {
    let components: Vec<_> = source
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    components
        .windows(3)
        .any(|w| w[0] == "lib" && w[1] == "modules" && w[2] == release)
}
