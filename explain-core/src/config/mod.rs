use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Locate the `config/` directory of a workspace member.
///
/// Works both when run from the member directory and from the workspace root.
pub fn configuration_directory(member: &str) -> Result<PathBuf, AppError> {
    let base_path = std::env::current_dir()?;

    if base_path.ends_with(member) {
        Ok(base_path.join("config"))
    } else {
        Ok(base_path.join(member).join("config"))
    }
}

/// Load `base.yaml` from `directory`, overlay `APP_`-prefixed environment
/// variables (`__` separates nesting levels) and validate the result.
pub fn load_settings<T>(directory: &Path) -> Result<T, AppError>
where
    T: DeserializeOwned + Validate,
{
    dotenvy::dotenv().ok();

    let settings = Cfg::builder()
        .add_source(File::from(directory.join("base.yaml")).required(true))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let settings: T = settings.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}
