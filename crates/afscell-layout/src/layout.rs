use crate::LayoutError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where the OpenAFS server binaries and configuration live.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LayoutVariant {
    /// Built with `--enable-transarc-paths` (`/usr/afs`, `/usr/vice`).
    Transarc,
    /// Built from source into `/usr/local`.
    Source,
    /// Distribution packages (`/usr/lib/openafs`, `/etc/openafs`).
    Ubuntu,
}

/// Where the Kerberos configuration lives and how its daemons are started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RealmVariant {
    Source,
    Ubuntu,
}

impl LayoutVariant {
    pub const ALL: [LayoutVariant; 3] = [Self::Transarc, Self::Source, Self::Ubuntu];
}

impl RealmVariant {
    pub const ALL: [RealmVariant; 2] = [Self::Source, Self::Ubuntu];
}

impl fmt::Display for LayoutVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutVariant::Transarc => write!(f, "transarc"),
            LayoutVariant::Source => write!(f, "source"),
            LayoutVariant::Ubuntu => write!(f, "ubuntu"),
        }
    }
}

impl fmt::Display for RealmVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealmVariant::Source => write!(f, "source"),
            RealmVariant::Ubuntu => write!(f, "ubuntu"),
        }
    }
}

impl FromStr for LayoutVariant {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transarc" => Ok(Self::Transarc),
            "source" => Ok(Self::Source),
            "ubuntu" => Ok(Self::Ubuntu),
            other => Err(LayoutError::UnknownVariant {
                kind: "layout",
                value: other.to_owned(),
                expected: "transarc, source, ubuntu",
            }),
        }
    }
}

impl FromStr for RealmVariant {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Self::Source),
            "ubuntu" => Ok(Self::Ubuntu),
            other => Err(LayoutError::UnknownVariant {
                kind: "realm layout",
                value: other.to_owned(),
                expected: "source, ubuntu",
            }),
        }
    }
}

/// Every external program a provisioning run may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Binary {
    Bosserver,
    Bos,
    Asetkey,
    Pts,
    Vos,
    Buserver,
    Ptserver,
    Vlserver,
    Fileserver,
    Volserver,
    Salvageserver,
    Salvager,
    Upserver,
    Kdb5Util,
    KadminLocal,
    Krb5kdc,
    Kadmind,
    Kinit,
    Kvno,
    Klist,
    Service,
}

impl Binary {
    pub const COUNT: usize = 21;

    pub const ALL: [Binary; Self::COUNT] = [
        Self::Bosserver,
        Self::Bos,
        Self::Asetkey,
        Self::Pts,
        Self::Vos,
        Self::Buserver,
        Self::Ptserver,
        Self::Vlserver,
        Self::Fileserver,
        Self::Volserver,
        Self::Salvageserver,
        Self::Salvager,
        Self::Upserver,
        Self::Kdb5Util,
        Self::KadminLocal,
        Self::Krb5kdc,
        Self::Kadmind,
        Self::Kinit,
        Self::Kvno,
        Self::Klist,
        Self::Service,
    ];

    /// Key used for this binary in the `[binaries]` configuration table.
    pub fn key(self) -> &'static str {
        match self {
            Self::Bosserver => "bosserver",
            Self::Bos => "bos",
            Self::Asetkey => "asetkey",
            Self::Pts => "pts",
            Self::Vos => "vos",
            Self::Buserver => "buserver",
            Self::Ptserver => "ptserver",
            Self::Vlserver => "vlserver",
            Self::Fileserver => "fileserver",
            Self::Volserver => "volserver",
            Self::Salvageserver => "salvageserver",
            Self::Salvager => "salvager",
            Self::Upserver => "upserver",
            Self::Kdb5Util => "kdb5_util",
            Self::KadminLocal => "kadmin_local",
            Self::Krb5kdc => "krb5kdc",
            Self::Kadmind => "kadmind",
            Self::Kinit => "kinit",
            Self::Kvno => "kvno",
            Self::Klist => "klist",
            Self::Service => "service",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key() == key)
    }

    pub fn purpose(self) -> &'static str {
        match self {
            Self::Bosserver => "basic overseer server (cell background server)",
            Self::Bos => "basic overseer client",
            Self::Asetkey => "registering the cell service key",
            Self::Pts => "protection database client",
            Self::Vos => "volume server client",
            Self::Buserver => "backup database server",
            Self::Ptserver => "protection database server",
            Self::Vlserver => "volume location server",
            Self::Fileserver => "demand-attach file server",
            Self::Volserver => "demand-attach volume server",
            Self::Salvageserver => "demand-attach salvage server",
            Self::Salvager => "demand-attach salvager",
            Self::Upserver => "update server",
            Self::Kdb5Util => "Kerberos realm database initialization",
            Self::KadminLocal => "Kerberos principal administration",
            Self::Krb5kdc => "Kerberos key distribution center",
            Self::Kadmind => "Kerberos administration daemon",
            Self::Kinit => "Kerberos authentication test",
            Self::Kvno => "reading the service key version",
            Self::Klist => "listing keytab entries",
            Self::Service => "restarting system services",
        }
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A binary location: either an absolute/relative path that must exist, or a
/// bare command name looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinaryPath(PathBuf);

impl BinaryPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    #[inline]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// A bare name has a single normal component, e.g. `kinit`.
    pub fn is_bare(&self) -> bool {
        let mut components = self.0.components();
        matches!(
            (components.next(), components.next()),
            (Some(std::path::Component::Normal(_)), None)
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    /// Resolve to an executable location on this host, if there is one.
    pub fn resolve(&self) -> Option<PathBuf> {
        if self.is_empty() {
            return None;
        }
        if self.is_bare() {
            return which::which(&self.0).ok();
        }
        self.0.is_file().then(|| self.0.clone())
    }
}

impl fmt::Display for BinaryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// One location per [`Binary`]; total by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryTable {
    paths: [BinaryPath; Binary::COUNT],
}

impl BinaryTable {
    pub fn from_fn(mut f: impl FnMut(Binary) -> BinaryPath) -> Self {
        Self {
            paths: std::array::from_fn(|i| f(Binary::ALL[i])),
        }
    }

    #[inline]
    pub fn get(&self, binary: Binary) -> &BinaryPath {
        &self.paths[binary as usize]
    }

    pub fn set(&mut self, binary: Binary, path: BinaryPath) {
        self.paths[binary as usize] = path;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Binary, &BinaryPath)> {
        Binary::ALL.into_iter().zip(self.paths.iter())
    }
}

/// Configuration files written or consumed during provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFiles {
    pub keytab: PathBuf,
    pub cellservdb_server: PathBuf,
    pub cellservdb_client: PathBuf,
    pub cacheinfo: PathBuf,
    pub krb5_conf: PathBuf,
    pub kadm5_acl: PathBuf,
}

const AES_KEYTAB_ENCRYPTION: &str = "aes256-cts-hmac-sha1-96:normal,aes128-cts-hmac-sha1-96:normal";
// The Ubuntu asetkey only accepts single DES keys.
const UBUNTU_KEYTAB_ENCRYPTION: &str = "des-cbc-crc:v4";

/// Resolved binary and file locations for one variant pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentLayout {
    pub variant: LayoutVariant,
    pub realm: RealmVariant,
    pub binaries: BinaryTable,
    pub files: ConfigFiles,
    pub keytab_encryption: Option<String>,
}

impl DeploymentLayout {
    pub fn resolve(variant: LayoutVariant, realm: RealmVariant) -> Self {
        let (server_dir, client_dir, etc_dir) = match variant {
            LayoutVariant::Transarc => ("/usr/afs/bin", "/usr/afs/bin", "/usr/vice/etc"),
            LayoutVariant::Source => (
                "/usr/local/libexec/openafs",
                "",
                "/usr/local/etc/openafs",
            ),
            LayoutVariant::Ubuntu => ("/usr/lib/openafs", "/usr/bin", "/etc/openafs"),
        };

        let in_dir = |dir: &str, name: &str| {
            if dir.is_empty() {
                BinaryPath::new(name)
            } else {
                BinaryPath::new(Path::new(dir).join(name))
            }
        };

        let binaries = BinaryTable::from_fn(|binary| match binary {
            Binary::Bosserver | Binary::Asetkey => match variant {
                LayoutVariant::Ubuntu => in_dir("/usr/sbin", binary.key()),
                _ => in_dir(client_dir, binary.key()),
            },
            Binary::Bos | Binary::Pts | Binary::Vos => in_dir(client_dir, binary.key()),
            Binary::Buserver
            | Binary::Ptserver
            | Binary::Vlserver
            | Binary::Fileserver
            | Binary::Volserver
            | Binary::Salvageserver
            | Binary::Salvager
            | Binary::Upserver => in_dir(server_dir, binary.key()),
            Binary::KadminLocal => BinaryPath::new("kadmin.local"),
            Binary::Kdb5Util
            | Binary::Krb5kdc
            | Binary::Kadmind
            | Binary::Kinit
            | Binary::Kvno
            | Binary::Klist
            | Binary::Service => BinaryPath::new(binary.key()),
        });

        let etc = Path::new(etc_dir);
        let (kadm5_acl, krb5_conf) = match realm {
            RealmVariant::Source => (
                PathBuf::from("/usr/local/var/krb5kdc/kadm5.acl"),
                PathBuf::from("/usr/local/etc/krb5/krb5.conf"),
            ),
            RealmVariant::Ubuntu => (
                PathBuf::from("/etc/kadm5.acl"),
                PathBuf::from("/etc/krb5.conf"),
            ),
        };
        let files = ConfigFiles {
            keytab: etc.join("afs.keytab"),
            cellservdb_server: etc.join("server").join("CellServDB"),
            cellservdb_client: etc.join("CellServDB"),
            cacheinfo: etc.join("cacheinfo"),
            krb5_conf,
            kadm5_acl,
        };

        let keytab_encryption = match variant {
            LayoutVariant::Ubuntu => UBUNTU_KEYTAB_ENCRYPTION,
            LayoutVariant::Transarc | LayoutVariant::Source => AES_KEYTAB_ENCRYPTION,
        };

        Self {
            variant,
            realm,
            binaries,
            files,
            keytab_encryption: Some(keytab_encryption.to_owned()),
        }
    }

    #[inline]
    pub fn binary(&self, binary: Binary) -> &BinaryPath {
        self.binaries.get(binary)
    }

    /// Whether the cell's background server is launched by us (as opposed to
    /// being managed by the distribution's service scripts).
    pub fn supervises_bosserver(&self) -> bool {
        self.variant != LayoutVariant::Ubuntu
    }

    /// The binaries a run with this variant pair will actually invoke.
    pub fn required_binaries(&self) -> Vec<Binary> {
        let mut required = vec![
            Binary::Kdb5Util,
            Binary::KadminLocal,
            Binary::Kinit,
            Binary::Kvno,
            Binary::Klist,
            Binary::Asetkey,
            Binary::Bos,
            Binary::Pts,
            Binary::Vos,
            Binary::Buserver,
            Binary::Ptserver,
            Binary::Vlserver,
            Binary::Fileserver,
            Binary::Volserver,
            Binary::Salvageserver,
            Binary::Salvager,
            Binary::Upserver,
        ];
        match self.realm {
            RealmVariant::Source => required.extend([Binary::Krb5kdc, Binary::Kadmind]),
            RealmVariant::Ubuntu => required.push(Binary::Service),
        }
        if self.supervises_bosserver() {
            required.push(Binary::Bosserver);
        } else if !required.contains(&Binary::Service) {
            required.push(Binary::Service);
        }
        required
    }
}
