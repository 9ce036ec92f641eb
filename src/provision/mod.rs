//! Dependency Resolver
//!
//! Provisions the AWS CLI binary and its runtime libraries on demand. The
//! resolver owns the on-disk dependency cache: a fixed install root keyed to
//! the running program, holding the extracted distribution and an optional
//! companion glibc runtime with its dynamic loader.
//!
//! Resolution walks an ordered list of strategies, each with the same
//! contract, until one yields a valid [`RuntimeBundle`]:
//!
//! 1. [`TarballBundle`]: the prebuilt tar.gz carrying `awscli/dist` plus a
//!    `glibc/` runtime directory and explicit loader.
//! 2. [`ZipDist`]: a legacy zip carrying only `awscli/dist`, executed
//!    without a loader.
//!
//! Every strategy is idempotent: a valid cached bundle short-circuits with
//! zero network I/O, and concurrent callers merely repeat harmless work
//! (unique temp downloads, last-writer-wins extraction).

pub mod fetch;

use crate::extract::{extract_archive, ExtractError, ExtractLimits};
use async_trait::async_trait;
use fetch::{FetchError, Fetcher, HttpFetcher};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable prefix for tarball bundle URL overrides.
const BUNDLE_URL_ENV: &str = "AWSGATE_BUNDLE_URL";

/// Environment variable prefix for legacy zip URL overrides.
const ZIP_URL_ENV: &str = "AWSGATE_ZIP_URL";

/// Built-in tarball URLs per architecture key. Overridable via
/// `AWSGATE_BUNDLE_URL_AMD64` / `AWSGATE_BUNDLE_URL_ARM64`.
const DEFAULT_BUNDLE_URLS: &[(&str, &str)] = &[
    (
        "AMD64",
        "https://github.com/awsgate/awsgate/releases/download/bundles-v1/aws_linux_amd64.tar.gz",
    ),
    ("ARM64", ""),
];

/// The legacy zip has no built-in source; it only participates when an
/// override URL is configured.
const DEFAULT_ZIP_URLS: &[(&str, &str)] = &[];

/// Error types for dependency provisioning
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("no bundle url configured for architecture {arch} (set {var})")]
    NoDownloadUrl { arch: String, var: String },

    #[error("bundle download failed: {0}")]
    Download(#[from] FetchError),

    #[error("bundle extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("provisioned file is not executable: {0}")]
    InvalidBundle(PathBuf),

    #[error("no provisioning strategy succeeded")]
    Exhausted,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything the Process Runner needs to invoke the provisioned binary.
///
/// `loader` is the single decision point between loader-mediated and direct
/// execution: present means the binary is started through the bundled
/// dynamic loader, absent means it is started directly with only
/// `LD_LIBRARY_PATH` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBundle {
    /// Path to the executable itself.
    pub binary: PathBuf,

    /// Shared-library search directories, in search order.
    pub library_dirs: Vec<PathBuf>,

    /// Explicit dynamic loader, when the bundle ships one.
    pub loader: Option<PathBuf>,
}

impl RuntimeBundle {
    /// Colon-joined library search path, or `None` when there are no dirs.
    pub fn library_path(&self) -> Option<String> {
        if self.library_dirs.is_empty() {
            return None;
        }
        Some(
            self.library_dirs
                .iter()
                .map(|d| d.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(":"),
        )
    }

    /// Check the bundle invariant: binary (and loader, if any) exist and
    /// are executable.
    fn validate(&self) -> Result<(), ProvisionError> {
        if !is_executable(&self.binary) {
            return Err(ProvisionError::InvalidBundle(self.binary.clone()));
        }
        if let Some(loader) = &self.loader {
            if !is_executable(loader) {
                return Err(ProvisionError::InvalidBundle(loader.clone()));
            }
        }
        Ok(())
    }
}

/// Fixed on-disk layout of the dependency cache.
///
/// All validity checks go through here rather than ad hoc `exists()` calls
/// at call sites.
#[derive(Debug, Clone)]
pub struct BundleLayout {
    root: PathBuf,
}

impl BundleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default install root: a `_deps` sibling of the running executable,
    /// so each deployment keys its own cache.
    pub fn default_root() -> io::Result<Self> {
        let exe = std::env::current_exe()?;
        let mut root = exe.into_os_string();
        root.push("_deps");
        Ok(Self::new(PathBuf::from(root)))
    }

    pub fn bundle_root(&self) -> PathBuf {
        self.root.join("bundle")
    }

    /// Directory holding the CLI distribution.
    pub fn dist_dir(&self) -> PathBuf {
        self.bundle_root().join("awscli").join("dist")
    }

    /// Companion glibc runtime directory (tarball bundles only).
    pub fn glibc_dir(&self) -> PathBuf {
        self.bundle_root().join("glibc")
    }

    /// The provisioned binary itself.
    pub fn binary(&self) -> PathBuf {
        self.dist_dir().join("aws")
    }

    /// Validity predicate for a full bundle install: executable binary plus
    /// the companion runtime directory.
    pub fn has_runtime_bundle(&self) -> bool {
        is_executable(&self.binary()) && self.glibc_dir().is_dir()
    }

    /// Validity predicate for a bare dist install: executable binary only.
    pub fn has_dist(&self) -> bool {
        is_executable(&self.binary())
    }
}

/// One way of producing a valid [`RuntimeBundle`].
///
/// Strategies share a contract so that adding or removing a fallback source
/// is a configuration change, not a code change.
#[async_trait]
pub trait ProvisionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn ensure(
        &self,
        fetcher: &dyn Fetcher,
        layout: &BundleLayout,
    ) -> Result<RuntimeBundle, ProvisionError>;
}

/// Prebuilt tar.gz bundle: `awscli/dist` plus `glibc/` with its loader.
pub struct TarballBundle {
    arch: String,
}

impl TarballBundle {
    pub fn new(arch: impl Into<String>) -> Self {
        Self { arch: arch.into() }
    }

    fn assemble(&self, layout: &BundleLayout) -> RuntimeBundle {
        let glibc = layout.glibc_dir();
        let dist = layout.dist_dir();
        RuntimeBundle {
            binary: layout.binary(),
            loader: resolve_loader(&glibc),
            library_dirs: vec![glibc, dist],
        }
    }
}

#[async_trait]
impl ProvisionStrategy for TarballBundle {
    fn name(&self) -> &'static str {
        "tarball-bundle"
    }

    async fn ensure(
        &self,
        fetcher: &dyn Fetcher,
        layout: &BundleLayout,
    ) -> Result<RuntimeBundle, ProvisionError> {
        // Fast path: a valid cached bundle means zero network I/O.
        if layout.has_runtime_bundle() {
            debug!(root = %layout.bundle_root().display(), "bundle already provisioned");
            return Ok(self.assemble(layout));
        }

        let url = resolve_url(&self.arch, BUNDLE_URL_ENV, DEFAULT_BUNDLE_URLS)?;
        fs::create_dir_all(layout.bundle_root())?;

        // Process-unique download target; removed on drop whether we
        // succeed or bail out below.
        let tmp = tempfile::Builder::new()
            .prefix("awsgate-bundle-")
            .suffix(".tar.gz")
            .tempfile()?;
        fetcher.fetch(&url, tmp.path()).await?;

        let archive = tmp.path().to_path_buf();
        let dest = layout.bundle_root();
        let limits = ExtractLimits::default();
        tokio::task::spawn_blocking(move || {
            extract_archive(&archive, &dest, &limits, |name| {
                in_subtrees(name, &["awscli", "glibc"])
            })
        })
        .await
        .map_err(|e| io::Error::other(e.to_string()))??;
        drop(tmp);

        // Archive formats do not reliably carry the execute bit across
        // platforms; set it explicitly on the binary and the loader.
        set_executable(&layout.binary())?;
        let bundle = self.assemble(layout);
        if let Some(loader) = &bundle.loader {
            set_executable(loader)?;
        }

        info!(binary = %bundle.binary.display(), "provisioned aws cli from tarball bundle");
        Ok(bundle)
    }
}

/// Legacy zip distribution: `awscli/dist` only, run without a loader.
pub struct ZipDist {
    arch: String,
}

impl ZipDist {
    pub fn new(arch: impl Into<String>) -> Self {
        Self { arch: arch.into() }
    }

    fn assemble(&self, layout: &BundleLayout) -> RuntimeBundle {
        RuntimeBundle {
            binary: layout.binary(),
            library_dirs: vec![layout.dist_dir()],
            loader: None,
        }
    }
}

#[async_trait]
impl ProvisionStrategy for ZipDist {
    fn name(&self) -> &'static str {
        "zip-dist"
    }

    async fn ensure(
        &self,
        fetcher: &dyn Fetcher,
        layout: &BundleLayout,
    ) -> Result<RuntimeBundle, ProvisionError> {
        if layout.has_dist() {
            debug!(root = %layout.bundle_root().display(), "dist already provisioned");
            return Ok(self.assemble(layout));
        }

        let url = resolve_url(&self.arch, ZIP_URL_ENV, DEFAULT_ZIP_URLS)?;
        fs::create_dir_all(layout.bundle_root())?;

        let tmp = tempfile::Builder::new()
            .prefix("awsgate-dist-")
            .suffix(".zip")
            .tempfile()?;
        fetcher.fetch(&url, tmp.path()).await?;

        let archive = tmp.path().to_path_buf();
        let dest = layout.bundle_root();
        let limits = ExtractLimits::default();
        tokio::task::spawn_blocking(move || {
            extract_archive(&archive, &dest, &limits, |name| {
                in_subtrees(name, &["awscli"])
            })
        })
        .await
        .map_err(|e| io::Error::other(e.to_string()))??;
        drop(tmp);

        set_executable(&layout.binary())?;

        let bundle = self.assemble(layout);
        info!(binary = %bundle.binary.display(), "provisioned aws cli from zip dist");
        Ok(bundle)
    }
}

/// The resolver: ordered strategies over a shared cache layout.
pub struct Provisioner {
    layout: BundleLayout,
    fetcher: Arc<dyn Fetcher>,
    strategies: Vec<Box<dyn ProvisionStrategy>>,
}

impl Provisioner {
    /// Resolver for the current architecture with the default cache root
    /// and HTTP fetcher.
    pub fn new() -> io::Result<Self> {
        let arch = std::env::consts::ARCH;
        Ok(Self::with_parts(
            BundleLayout::default_root()?,
            Arc::new(HttpFetcher::new()),
            vec![
                Box::new(TarballBundle::new(arch)),
                Box::new(ZipDist::new(arch)),
            ],
        ))
    }

    pub fn with_parts(
        layout: BundleLayout,
        fetcher: Arc<dyn Fetcher>,
        strategies: Vec<Box<dyn ProvisionStrategy>>,
    ) -> Self {
        Self {
            layout,
            fetcher,
            strategies,
        }
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    /// Produce a valid [`RuntimeBundle`], trying each strategy in order.
    ///
    /// Failures are not retried within a strategy; the next strategy in the
    /// list is the only fallback.
    pub async fn ensure(&self) -> Result<RuntimeBundle, ProvisionError> {
        let mut last_err = None;

        for strategy in &self.strategies {
            match strategy.ensure(self.fetcher.as_ref(), &self.layout).await {
                Ok(bundle) => {
                    bundle.validate()?;
                    return Ok(bundle);
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), error = %err, "provisioning strategy failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(ProvisionError::Exhausted))
    }
}

/// Map a Rust target architecture onto the bundle key used in env-var
/// names and the default URL table.
fn arch_key(arch: &str) -> Option<&'static str> {
    match arch {
        "x86_64" => Some("AMD64"),
        "aarch64" => Some("ARM64"),
        _ => None,
    }
}

/// Resolve the download URL for `arch`: env override first, then the
/// built-in default.
fn resolve_url(
    arch: &str,
    env_prefix: &str,
    defaults: &[(&str, &str)],
) -> Result<String, ProvisionError> {
    let key = arch_key(arch).ok_or_else(|| ProvisionError::UnsupportedArch(arch.to_string()))?;
    let var = format!("{env_prefix}_{key}");

    if let Ok(url) = std::env::var(&var) {
        if !url.is_empty() {
            return Ok(url);
        }
    }
    if let Some((_, url)) = defaults.iter().find(|(k, _)| *k == key) {
        if !url.is_empty() {
            return Ok(url.to_string());
        }
    }
    Err(ProvisionError::NoDownloadUrl {
        arch: arch.to_string(),
        var,
    })
}

/// Keep only entries whose first path component names one of `roots`.
fn in_subtrees(name: &str, roots: &[&str]) -> bool {
    let name = name.strip_prefix("./").unwrap_or(name);
    let first = name.split('/').next().unwrap_or("");
    roots.iter().any(|root| first == *root)
}

/// Find the bundled dynamic loader inside the glibc runtime directory.
///
/// The well-known per-architecture names are tried first; any other
/// `ld-linux-*.so*` file is accepted as a fallback.
fn resolve_loader(glibc_dir: &Path) -> Option<PathBuf> {
    for known in ["ld-linux-x86-64.so.2", "ld-linux-aarch64.so.1"] {
        let candidate = glibc_dir.join(known);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let entries = fs::read_dir(glibc_dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("ld-linux-") && name.contains(".so") {
            return Some(entry.path());
        }
    }
    None
}

/// Whether a file exists with any execute bit set.
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
