use crate::secret::Secret;
use crate::CoreError;
use afscell_layout::{CacheSection, DeploymentLayout};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Name of the administrative principal, AFS user, and ACL entry.
pub const ADMIN_USER: &str = "admin";
/// Service principal primary for the cell.
pub const SERVICE_PRIMARY: &str = "afs";

/// Who and where: the names a provisioning run is parameterized by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellIdentity {
    /// Host name used with `bos` and `vos`.
    pub machine: String,
    pub cell: String,
    /// Database server address advertised in CellServDB.
    pub address: String,
    pub realm: String,
}

impl CellIdentity {
    pub fn validate(&self) -> Result<(), CoreError> {
        for (what, value) in [
            ("machine name", &self.machine),
            ("cell name", &self.cell),
            ("realm name", &self.realm),
        ] {
            if value.is_empty() {
                return Err(CoreError::Validation(format!("{what} must not be empty")));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(CoreError::Validation(format!(
                    "{what} '{value}' must not contain whitespace"
                )));
            }
        }
        self.address.parse::<IpAddr>().map_err(|_| {
            CoreError::Validation(format!(
                "cell address '{}' is not an IP address",
                self.address
            ))
        })?;
        Ok(())
    }

    pub fn admin_principal(&self) -> String {
        format!("{ADMIN_USER}@{}", self.realm)
    }

    pub fn service_principal(&self) -> String {
        format!("{SERVICE_PRIMARY}/{}@{}", self.cell, self.realm)
    }
}

/// Version number of the cell service key in the keytab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyVersion(u32);

impl KeyVersion {
    pub fn new(kvno: u32) -> Self {
        Self(kvno)
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        raw.trim()
            .parse()
            .map(Self)
            .map_err(|_| CoreError::Validation(format!("invalid key version '{raw}'")))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State threaded through the pipeline. Secrets are dropped as soon as the
/// last stage needing them has completed.
#[derive(Debug)]
pub struct ProvisioningContext {
    pub layout: DeploymentLayout,
    pub identity: CellIdentity,
    pub tolerant: bool,
    pub upgrade: bool,
    pub cache: CacheSection,
    realm_secret: Option<Secret>,
    admin_secret: Option<Secret>,
    key_version: Option<KeyVersion>,
}

impl ProvisioningContext {
    pub fn new(
        layout: DeploymentLayout,
        identity: CellIdentity,
        realm_secret: Secret,
        admin_secret: Secret,
    ) -> Self {
        Self {
            layout,
            identity,
            tolerant: false,
            upgrade: false,
            cache: CacheSection::default(),
            realm_secret: Some(realm_secret),
            admin_secret: Some(admin_secret),
            key_version: None,
        }
    }

    pub fn realm_secret(&self) -> Result<&Secret, CoreError> {
        self.realm_secret
            .as_ref()
            .ok_or_else(|| CoreError::Validation("realm master key already released".to_owned()))
    }

    pub fn admin_secret(&self) -> Result<&Secret, CoreError> {
        self.admin_secret
            .as_ref()
            .ok_or_else(|| CoreError::Validation("admin password already released".to_owned()))
    }

    pub fn release_realm_secret(&mut self) {
        self.realm_secret = None;
    }

    pub fn release_admin_secret(&mut self) {
        self.admin_secret = None;
    }

    pub fn key_version(&self) -> Option<KeyVersion> {
        self.key_version
    }

    /// Required by key registration; absent only if extraction never ran.
    pub fn require_key_version(&self) -> Result<KeyVersion, CoreError> {
        self.key_version.ok_or_else(|| {
            CoreError::Validation("service key version has not been extracted".to_owned())
        })
    }

    pub fn set_key_version(&mut self, kvno: KeyVersion) {
        self.key_version = Some(kvno);
    }

    /// `-e <enctypes>` for kadmin, when the layout pins key encryption.
    pub fn encryption_option(&self) -> String {
        match &self.layout.keytab_encryption {
            Some(enc) => format!(" -e {enc}"),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use afscell_layout::{LayoutVariant, RealmVariant};

    fn identity() -> CellIdentity {
        CellIdentity {
            machine: "fs1".to_owned(),
            cell: "example.org".to_owned(),
            address: "192.0.2.10".to_owned(),
            realm: "EXAMPLE.ORG".to_owned(),
        }
    }

    #[test]
    fn principals_use_realm() {
        let id = identity();
        assert_eq!(id.admin_principal(), "admin@EXAMPLE.ORG");
        assert_eq!(id.service_principal(), "afs/example.org@EXAMPLE.ORG");
    }

    #[test]
    fn identity_validation() {
        identity().validate().unwrap();

        let mut empty = identity();
        empty.machine.clear();
        assert!(empty.validate().unwrap_err().to_string().contains("machine name"));

        let mut spaced = identity();
        spaced.cell = "example org".to_owned();
        assert!(spaced.validate().is_err());

        let mut bad_address = identity();
        bad_address.address = "fs1.example.org".to_owned();
        assert!(bad_address
            .validate()
            .unwrap_err()
            .to_string()
            .contains("not an IP address"));
    }

    #[test]
    fn key_version_parse() {
        assert_eq!(KeyVersion::parse("7").unwrap(), KeyVersion::new(7));
        assert_eq!(KeyVersion::parse(" 12\n").unwrap().get(), 12);
        assert!(KeyVersion::parse("seven").is_err());
    }

    #[test]
    fn secrets_are_released() {
        let layout = DeploymentLayout::resolve(LayoutVariant::Transarc, RealmVariant::Source);
        let mut ctx =
            ProvisioningContext::new(layout, identity(), Secret::new("mk"), Secret::new("pw"));
        assert_eq!(ctx.realm_secret().unwrap().expose(), "mk");
        ctx.release_realm_secret();
        assert!(ctx.realm_secret().is_err());
        assert_eq!(ctx.admin_secret().unwrap().expose(), "pw");
        ctx.release_admin_secret();
        assert!(ctx.admin_secret().is_err());
    }

    #[test]
    fn encryption_option_follows_layout() {
        let layout = DeploymentLayout::resolve(LayoutVariant::Ubuntu, RealmVariant::Ubuntu);
        let mut ctx =
            ProvisioningContext::new(layout, identity(), Secret::new("mk"), Secret::new("pw"));
        assert_eq!(ctx.encryption_option(), " -e des-cbc-crc:v4");
        ctx.layout.keytab_encryption = None;
        assert_eq!(ctx.encryption_option(), "");
        assert!(ctx.require_key_version().is_err());
        ctx.set_key_version(KeyVersion::new(3));
        assert_eq!(ctx.key_version(), Some(KeyVersion::new(3)));
    }
}
