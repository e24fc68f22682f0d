use crate::layout::{Binary, BinaryPath, DeploymentLayout};
use crate::LayoutError;
use std::fmt;
use std::path::Path;

/// A required binary that could not be found on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBinary {
    pub binary: Binary,
    pub path: BinaryPath,
    pub purpose: &'static str,
}

impl fmt::Display for MissingBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = if self.path.is_bare() {
            format!("'{}' not found on PATH", self.path)
        } else {
            format!("'{}' does not exist", self.path)
        };
        write!(f, "  - {}: {} ({location})", self.binary, self.purpose)
    }
}

/// Check every binary the layout will invoke.
/// Returns a list of missing items. Empty list means all binaries are present.
pub fn check_binaries(layout: &DeploymentLayout) -> Vec<MissingBinary> {
    layout
        .required_binaries()
        .into_iter()
        .filter_map(|binary| {
            let path = layout.binary(binary);
            if path.resolve().is_some() {
                None
            } else {
                Some(MissingBinary {
                    binary,
                    path: path.clone(),
                    purpose: binary.purpose(),
                })
            }
        })
        .collect()
}

/// Format a list of missing binaries into a user-facing error message.
pub fn format_missing(missing: &[MissingBinary]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing binaries:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nInstall OpenAFS and MIT Kerberos for the selected layout, or override the paths in the configuration file.");
    msg
}

/// The client cache directory may be absent, but must not be a regular file.
pub fn validate_cache_dir(cache_dir: &Path) -> Result<(), LayoutError> {
    if cache_dir.exists() && !cache_dir.is_dir() {
        return Err(LayoutError::CacheDirIsFile(cache_dir.to_path_buf()));
    }
    Ok(())
}

impl DeploymentLayout {
    /// Fail with every missing binary listed at once.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let missing = check_binaries(self);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LayoutError::MissingBinaries(format_missing(&missing)))
        }
    }
}
