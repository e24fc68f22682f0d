pub mod check;
pub mod completions;
pub mod man_pages;
pub mod setup;

use afscell_core::CoreError;
use afscell_layout::{parse_config_file, DeploymentLayout, LayoutVariant, ProvisionConfig, RealmVariant};
use std::path::Path;
use tracing::{debug, info};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_VALIDATION_ERROR: u8 = 2;
pub const EXIT_CONFIG_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// The configuration file, or the built-in defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<ProvisionConfig, String> {
    match path {
        Some(path) => {
            info!("using configuration {}", path.display());
            parse_config_file(path).map_err(|e| format!("config error: {}: {e}", path.display()))
        }
        None => {
            debug!("no configuration file given, using built-in defaults");
            Ok(ProvisionConfig::default())
        }
    }
}

/// Variant defaults with the configuration's overrides applied.
pub fn resolve_layout(
    config: &ProvisionConfig,
    layout: LayoutVariant,
    realm: RealmVariant,
) -> Result<DeploymentLayout, String> {
    config
        .apply_to(DeploymentLayout::resolve(layout, realm))
        .map_err(|e| format!("config error: {e}"))
}

/// Prefix the message so `main` can pick the exit code.
pub fn describe(err: &CoreError) -> String {
    let stage = err.stage().map(|s| format!(" in {s}")).unwrap_or_default();
    match err.root() {
        CoreError::Validation(msg) => format!("validation error{stage}: {msg}"),
        CoreError::Config(e) => format!("config error{stage}: {e}"),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afscell_core::StageId;
    use afscell_layout::Binary;

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_VALIDATION_ERROR);
        assert_ne!(EXIT_VALIDATION_ERROR, EXIT_CONFIG_ERROR);
    }

    #[test]
    fn describe_prefixes_by_root_cause() {
        let validation = CoreError::Stage {
            stage: StageId::ValidateLayout,
            source: Box::new(CoreError::Validation("cell name is empty".to_owned())),
        };
        assert_eq!(
            describe(&validation),
            "validation error in validate-layout: cell name is empty"
        );
        assert_eq!(
            describe(&CoreError::Validation("bad address".to_owned())),
            "validation error: bad address"
        );
        assert_eq!(describe(&CoreError::Interrupted), "interrupted by user");
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let err = load_config(Some(Path::new("/nonexistent/afscell.toml"))).unwrap_err();
        assert!(err.starts_with("config error:"));
    }

    #[test]
    fn overrides_apply_to_resolved_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("afscell.toml");
        std::fs::write(&path, "[binaries]\nvos = \"/opt/openafs/bin/vos\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        let layout = resolve_layout(&config, LayoutVariant::Transarc, RealmVariant::Source).unwrap();
        assert_eq!(
            layout.binary(Binary::Vos).as_path(),
            Path::new("/opt/openafs/bin/vos")
        );
        assert_eq!(
            layout.binary(Binary::Bos).as_path(),
            Path::new("/usr/afs/bin/bos")
        );
    }
}
