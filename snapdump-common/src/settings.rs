//! Layered settings loading shared by `snapdump` and `snapload`.
//!
//! Precedence, lowest to highest: compiled-in `Default`, an optional config
//! file, environment variables (`SNAPDUMP_*`/`SNAPLOAD_*`, double
//! underscore as the nested separator), then whatever the binary's own
//! `clap` layer overlays on top of the result.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Connection parameters common to both the dump and restore sides.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// Socket path, preferred over host/port when set.
    pub socket: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            socket: None,
        }
    }
}

/// Fields every binary in the workspace shares.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CommonSettings {
    pub connection: ConnectionSettings,
    pub threads: u32,
    pub human_logs: bool,
    pub directory: String,
    pub pause_at_mb: Option<u64>,
    pub resume_at_mb: Option<u64>,
}

impl Default for CommonSettings {
    fn default() -> Self {
        CommonSettings {
            connection: ConnectionSettings::default(),
            threads: num_cpus_hint(),
            human_logs: true,
            directory: "export".to_string(),
            pause_at_mb: None,
            resume_at_mb: None,
        }
    }
}

fn num_cpus_hint() -> u32 {
    num_cpus::get() as u32
}

/// Load a settings value of type `T` from the default/file/env layers.
/// `T` must implement `Default` to seed the merge and `Deserialize` to
/// receive it; the caller's `clap` layer is expected to overlay its own
/// explicit flags onto the returned value afterwards.
pub fn load_layered<T>(env_prefix: &str, config_path: Option<&str>) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Serialize + Default,
{
    let defaults = T::default();
    let mut builder = Config::try_from(&defaults)?;
    if let Some(path) = config_path {
        builder = builder.merge(File::with_name(path))?.clone();
    }
    builder = builder
        .merge(Environment::with_prefix(env_prefix).separator("__"))?
        .clone();
    builder.try_into()
}
