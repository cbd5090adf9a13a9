use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::dump::error::DumpError;

pub const MYSQL_DB_HOST: &str = "MYSQL_DB_HOST";
pub const MYSQL_DB_NAME: &str = "MYSQL_DB_NAME";
pub const MYSQL_DB_USER: &str = "MYSQL_DB_USER";
pub const MYSQL_DB_PASSWORD: &str = "MYSQL_DB_PASSWORD";
pub const MYSQL_DB_PORT: &str = "MYSQL_DB_PORT";

#[derive(clap::Parser, Clone, Debug, Default)]
#[command(
    name = "mysql-dump",
    version,
    about = "Dump a MySQL database to mysql-dump/dump_<unix_timestamp>.sql"
)]
pub struct DumpArgs {
    /// TOML file with runner settings
    #[clap(long, env = "MYSQL_DUMP_CONFIG")]
    pub config: Option<PathBuf>,
    /// Dump program to run instead of `mysqldump`
    #[clap(long, env = "MYSQL_DUMP_TOOL")]
    pub tool: Option<String>,
    /// Directory the dump file is written to
    #[clap(long, env = "MYSQL_DUMP_DIR")]
    pub output_dir: Option<PathBuf>,
    /// Kill the dump program after this many seconds, 0 for no limit
    #[clap(long, env = "MYSQL_DUMP_TIMEOUT")]
    pub timeout: Option<u64>,
    /// Exit with status 1 when the dump fails
    #[clap(long)]
    pub strict: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DumpSettings {
    pub tool: String,
    pub output_dir: PathBuf,
    pub timeout_secs: Option<u64>,
}

impl Default for DumpSettings {
    fn default() -> Self {
        DumpSettings {
            tool: "mysqldump".to_string(),
            output_dir: PathBuf::from("mysql-dump"),
            timeout_secs: None,
        }
    }
}

impl DumpSettings {
    pub fn from_toml(toml: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str::<DumpSettings>(toml)?)
    }

    /// Defaults, then the settings file, then flags and their env vars.
    pub fn load(args: &DumpArgs) -> anyhow::Result<Self> {
        let mut settings = match &args.config {
            Some(path) => Self::read(path)?,
            None => DumpSettings::default(),
        };
        if let Some(tool) = &args.tool {
            settings.tool = tool.clone();
        }
        if let Some(dir) = &args.output_dir {
            settings.output_dir = dir.clone();
        }
        if args.timeout.is_some() {
            settings.timeout_secs = args.timeout;
        }
        Ok(settings)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let toml = std::fs::read_to_string(path)
            .with_context(|| format!("could not read settings file `{}`", path.display()))?;
        Self::from_toml(&toml)
            .with_context(|| format!("invalid settings file `{}`", path.display()))
    }

    /// `None` and `Some(0)` both mean the dump may run for as long as it takes.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Connection values for one dump, read once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct DumpConfig {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

impl fmt::Debug for DumpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpConfig")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("port", &self.port)
            .finish()
    }
}

impl DumpConfig {
    pub fn from_env() -> Result<Self, DumpError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads all five values through `lookup`. Absent and blank values are
    /// collected so the error names every one of them.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DumpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let host = required(&lookup, MYSQL_DB_HOST, &mut missing);
        let database = required(&lookup, MYSQL_DB_NAME, &mut missing);
        let user = required(&lookup, MYSQL_DB_USER, &mut missing);
        let password = required(&lookup, MYSQL_DB_PASSWORD, &mut missing);
        let port = required(&lookup, MYSQL_DB_PORT, &mut missing);

        match (host, database, user, password, port) {
            (Some(host), Some(database), Some(user), Some(password), Some(port)) => {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| DumpError::InvalidPort(port.clone()))?;
                Ok(DumpConfig {
                    host,
                    database,
                    user,
                    password,
                    port,
                })
            }
            _ => Err(DumpError::Configuration { missing }),
        }
    }
}

fn required<F>(lookup: &F, name: &'static str, missing: &mut Vec<&'static str>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Some(value),
        _ => {
            missing.push(name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::DumpRunner;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full() -> HashMap<String, String> {
        vars(&[
            (MYSQL_DB_HOST, "db.internal"),
            (MYSQL_DB_NAME, "shop"),
            (MYSQL_DB_USER, "backup"),
            (MYSQL_DB_PASSWORD, "s3cret"),
            (MYSQL_DB_PORT, "3306"),
        ])
    }

    #[test]
    fn reads_all_five_values() {
        let env = full();
        let config = DumpConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.database, "shop");
        assert_eq!(config.user, "backup");
        assert_eq!(config.password, "s3cret");
        assert_eq!(config.port, 3306);
    }

    #[test]
    fn missing_and_blank_values_are_reported_together() {
        let mut env = full();
        env.remove(MYSQL_DB_PASSWORD);
        env.insert(MYSQL_DB_HOST.to_string(), "  ".to_string());

        let err = DumpConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        match err {
            DumpError::Configuration { missing } => {
                assert_eq!(missing, vec![MYSQL_DB_HOST, MYSQL_DB_PASSWORD])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn bad_port_is_a_configuration_error() {
        let mut env = full();
        env.insert(MYSQL_DB_PORT.to_string(), "mysql".to_string());
        let err = DumpConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, DumpError::InvalidPort(ref p) if p == "mysql"));
        assert!(err.is_configuration());
    }

    #[test]
    fn debug_hides_the_password() {
        let env = full();
        let config = DumpConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("db.internal"));
    }

    #[test]
    fn settings_file_fills_in_defaults() {
        let settings = DumpSettings::from_toml("timeout_secs = 600\n").unwrap();
        assert_eq!(settings.tool, "mysqldump");
        assert_eq!(settings.output_dir, PathBuf::from("mysql-dump"));
        assert_eq!(settings.timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn zero_timeout_means_no_limit() {
        let settings = DumpSettings::from_toml("timeout_secs = 0\n").unwrap();
        assert_eq!(settings.timeout(), None);

        let args = DumpArgs {
            timeout: Some(0),
            ..Default::default()
        };
        assert_eq!(DumpSettings::load(&args).unwrap().timeout(), None);
        assert!(DumpRunner::new(&DumpSettings::load(&args).unwrap())
            .timeout()
            .is_none());
    }

    #[test]
    fn settings_file_rejects_unknown_keys() {
        assert!(DumpSettings::from_toml("retries = 3\n").is_err());
    }

    #[test]
    fn flags_override_the_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.toml");
        std::fs::write(
            &path,
            "tool = \"/usr/local/bin/mysqldump\"\noutput_dir = \"/var/backups/mysql\"\ntimeout_secs = 60\n",
        )
        .unwrap();

        let args = DumpArgs {
            config: Some(path),
            output_dir: Some(PathBuf::from("nightly")),
            ..Default::default()
        };
        let settings = DumpSettings::load(&args).unwrap();
        assert_eq!(settings.tool, "/usr/local/bin/mysqldump");
        assert_eq!(settings.output_dir, PathBuf::from("nightly"));
        assert_eq!(settings.timeout_secs, Some(60));
    }

    #[test]
    fn no_flags_means_defaults() {
        let settings = DumpSettings::load(&DumpArgs::default()).unwrap();
        assert_eq!(settings, DumpSettings::default());
        assert_eq!(settings.timeout(), None);
    }
}
