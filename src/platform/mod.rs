use std::path::{Path, PathBuf};

/// Platform-specific operations abstracted behind a common interface.
/// Each OS provides its own `NativePlatform` implementation so call sites
/// remain free of `#[cfg]` blocks.
pub trait Platform {
    /// Container CLI used to run connectors when none is configured.
    fn container_cli() -> &'static str;

    /// Set restrictive *directory* permissions (0o700 on Unix, no-op on Windows).
    fn restrict_dir_permissions(path: &Path);

    /// Set restrictive *file* permissions (0o600 on Unix, no-op on Windows).
    fn restrict_file_permissions(path: &Path);

    /// Binary filename for this platform (`"silo-runner"` / `"silo-runner.exe"`).
    fn binary_name() -> &'static str;

    /// Root data directory for the worker.
    /// Unix: `$XDG_DATA_HOME/silo-runner`, Windows: `%APPDATA%\silo-runner`.
    fn data_dir() -> PathBuf;
}

const DATA_DIR_NAME: &str = "silo-runner";

/// Pick the data directory from the platform base, falling back to a dot
/// directory under home, then the working directory.
pub(crate) fn resolve_data_dir(base: Option<PathBuf>) -> PathBuf {
    if let Some(base) = base {
        return base.join(DATA_DIR_NAME);
    }
    match dirs::home_dir() {
        Some(home) => home.join(format!(".{}", DATA_DIR_NAME)),
        None => PathBuf::from(format!(".{}", DATA_DIR_NAME)),
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::NativePlatform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::NativePlatform;
