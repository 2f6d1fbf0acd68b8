//! Config path resolution
//!
//! Config files live in one directory, taken from `PROPSYS_CONFIG_DIR` when
//! set and otherwise next to the running executable.

use std::path::PathBuf;

use super::{ConfigError, ConfigResult};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "PROPSYS_CONFIG_DIR";

/// Returns the base configs directory.
///
/// Path: `$PROPSYS_CONFIG_DIR`, or `<exe dir>/configs/`
pub fn configs_dir() -> ConfigResult<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(|dir| dir.join("configs"))
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Returns the core config path.
///
/// Path: `<configs>/core.toml`
pub fn core_config_path() -> ConfigResult<PathBuf> {
    Ok(configs_dir()?.join("core.toml"))
}

/// Returns the ini file holding a record type's saved fields.
///
/// Path: `<configs>/{record_name}.ini`
pub fn record_config_path(record_name: &str) -> ConfigResult<PathBuf> {
    Ok(configs_dir()?.join(format!("{}.ini", record_name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_config_path_format() {
        let path = record_config_path("GameSettings").unwrap();
        assert!(path.ends_with("GameSettings.ini"));
        assert_eq!(
            path.parent().unwrap(),
            core_config_path().unwrap().parent().unwrap()
        );
    }
}
