use super::{json_pretty, load_config, resolve_layout, EXIT_SUCCESS, EXIT_VALIDATION_ERROR};
use afscell_layout::{validate_cache_dir, DeploymentLayout, LayoutVariant, RealmVariant};
use console::Style;
use serde::Serialize;
use std::path::Path;

pub fn run(
    layout: LayoutVariant,
    realm: RealmVariant,
    config_path: Option<&Path>,
    json_output: bool,
) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let layout = resolve_layout(&config, layout, realm)?;

    let mut checks = binary_checks(&layout);
    checks.push(match validate_cache_dir(&config.cache.dir) {
        Ok(()) => Check::pass("cache_dir", format!("cache directory {}", config.cache.dir.display())),
        Err(e) => Check::fail("cache_dir", e.to_string()),
    });
    let all_pass = checks.iter().all(|c| c.status == "pass");

    if json_output {
        let payload = serde_json::json!({
            "layout": layout.variant,
            "realm_layout": layout.realm,
            "healthy": all_pass,
            "checks": checks,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("afscell check ({} layout, {} realm layout)\n", layout.variant, layout.realm);
        for check in &checks {
            let icon = if check.status == "pass" {
                Style::new().green().apply_to("✓")
            } else {
                Style::new().red().apply_to("✗")
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass {
        EXIT_SUCCESS
    } else {
        EXIT_VALIDATION_ERROR
    })
}

fn binary_checks(layout: &DeploymentLayout) -> Vec<Check> {
    layout
        .required_binaries()
        .into_iter()
        .map(|binary| {
            let path = layout.binary(binary);
            match path.resolve() {
                Some(found) => Check::pass(
                    binary.key(),
                    format!("{binary}: {} ({})", found.display(), binary.purpose()),
                ),
                None => Check::fail(
                    binary.key(),
                    format!("{binary}: '{path}' not found ({})", binary.purpose()),
                ),
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn pass(name: &str, message: String) -> Self {
        Self {
            name: name.to_owned(),
            status: "pass",
            message,
        }
    }

    fn fail(name: &str, message: String) -> Self {
        Self {
            name: name.to_owned(),
            status: "fail",
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afscell_layout::{Binary, BinaryPath};

    #[test]
    fn one_check_per_required_binary() {
        let layout = DeploymentLayout::resolve(LayoutVariant::Ubuntu, RealmVariant::Ubuntu);
        let checks = binary_checks(&layout);
        assert_eq!(checks.len(), layout.required_binaries().len());
        assert!(checks.iter().any(|c| c.name == "service"));
        assert!(!checks.iter().any(|c| c.name == "bosserver"));
    }

    #[test]
    fn absent_binary_fails() {
        let mut layout = DeploymentLayout::resolve(LayoutVariant::Transarc, RealmVariant::Source);
        layout
            .binaries
            .set(Binary::Vos, BinaryPath::new("/nonexistent/afscell/vos"));
        let checks = binary_checks(&layout);
        let vos = checks.iter().find(|c| c.name == "vos").unwrap();
        assert_eq!(vos.status, "fail");
        assert!(vos.message.contains("/nonexistent/afscell/vos"));
    }

    #[test]
    fn present_binary_passes() {
        let dir = tempfile::tempdir().unwrap();
        let vos = dir.path().join("vos");
        std::fs::write(&vos, "").unwrap();

        let mut layout = DeploymentLayout::resolve(LayoutVariant::Transarc, RealmVariant::Source);
        layout.binaries.set(Binary::Vos, BinaryPath::new(&vos));
        let checks = binary_checks(&layout);
        let check = checks.iter().find(|c| c.name == "vos").unwrap();
        assert_eq!(check.status, "pass");
    }
}
