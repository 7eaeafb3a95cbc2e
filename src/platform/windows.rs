use std::path::{Path, PathBuf};

use super::{Platform, resolve_data_dir};

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn container_cli() -> &'static str {
        "docker.exe"
    }

    fn restrict_dir_permissions(_path: &Path) {}

    fn restrict_file_permissions(_path: &Path) {}

    fn binary_name() -> &'static str {
        "silo-runner.exe"
    }

    fn data_dir() -> PathBuf {
        resolve_data_dir(dirs::config_dir())
    }
}
