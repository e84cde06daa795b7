use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::{Error, Stage};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithMsg, WithStage};
use crate::backup::scalar::deserialize_scalar_string;
use crate::backup::validate::{
    validate_client_name, validate_log_file, validate_non_zero_duration, validate_writable_dir,
};
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

static DEFAULT_DUMP_PROGRAM: &str = "mysqldump";
static DEFAULT_DUMP_ARGS: [&str; 3] = ["-e", "--opt", "-c"];
static DEFAULT_DUMP_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// The loaded settings document.
///
/// Client entries are kept as raw YAML until one is resolved, so a malformed entry only
/// fails the run that selects it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    databases: BTreeMap<String, serde_yml::Value>,
}

/// Everything one backup run needs to know about a client.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct ClientProfile {
    #[validate(custom(function = validate_client_name))]
    name: String,
    #[validate(nested)]
    database: DatabaseConfig,
    working_dir: PathBuf,
    #[validate(nested)]
    backup_dir: BackupDirConfig,
    #[validate(custom(function = validate_log_file))]
    log_file: PathBuf,
    #[serde(default)]
    #[validate(nested)]
    dump: DumpConfig,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct DatabaseConfig {
    #[serde(deserialize_with = "deserialize_scalar_string")]
    #[validate(length(min = 1))]
    host: String,
    port: Option<u16>,
    #[serde(deserialize_with = "deserialize_scalar_string")]
    #[validate(length(min = 1))]
    username: String,
    password: RedactedString,
    #[serde(deserialize_with = "deserialize_scalar_string")]
    #[validate(length(min = 1))]
    database: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupDirConfig {
    /// Root for the staging directory, the lock file and the final archive.
    #[serde(rename = "default")]
    #[validate(custom(function = validate_writable_dir))]
    root: PathBuf,
}

/// How the external dump tool is invoked.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct DumpConfig {
    #[serde(default = "default_dump_program")]
    #[validate(length(min = 1))]
    program: String,
    /// Extra flags, placed before the connection arguments.
    #[serde(default = "default_dump_args")]
    args: Vec<String>,
    #[serde(default = "default_dump_timeout", with = "humantime_serde")]
    #[validate(custom(function = validate_non_zero_duration))]
    timeout: Duration,
}

fn default_dump_program() -> String {
    DEFAULT_DUMP_PROGRAM.to_string()
}

fn default_dump_args() -> Vec<String> {
    DEFAULT_DUMP_ARGS.iter().map(|a| a.to_string()).collect()
}

fn default_dump_timeout() -> Duration {
    DEFAULT_DUMP_TIMEOUT
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            program: default_dump_program(),
            args: default_dump_args(),
            timeout: default_dump_timeout(),
        }
    }
}

impl Settings {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader::<_, Settings>(f).map_err(Error::from))
            .with_msg(format!("Parse YAML config failed: {:?}", path))
            .with_stage(Stage::Configuration)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yml::from_str::<Settings>(yaml)
            .map_err(Error::from)
            .with_msg("Parse YAML config failed")
            .with_stage(Stage::Configuration)
    }

    pub fn client_ids(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    /// Looks up `client_id`, then parses and validates its entry.
    pub fn resolve(&self, client_id: &str) -> Result<ClientProfile> {
        let value = self
            .databases
            .get(client_id)
            .cloned()
            .ok_or_else(|| Error::UnknownClient(client_id.to_string()))
            .with_stage(Stage::Configuration)?;

        serde_yml::from_value::<ClientProfile>(value)
            .map_err(Error::from)
            .and_then(|profile| {
                profile
                    .validate()
                    .map_err(Error::from)
                    .map(|_| profile)
            })
            .with_msg(format!("Invalid configuration for client {client_id:?}"))
            .with_stage(Stage::Configuration)
    }
}

/// Reads the settings document at `config_path` and resolves `client_id` from it.
pub fn resolve<P: AsRef<Path>>(config_path: P, client_id: &str) -> Result<ClientProfile> {
    Settings::from_path(config_path)?.resolve(client_id)
}

/// Loads `.env` from the current directory or one of its parents.
///
/// A missing file is not an error. Returns the path that was loaded.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    optional_env_file(dotenvy::dotenv())
}

/// Loads the env file at `path`. Returns `false` when it does not exist.
pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    optional_env_file(dotenvy::from_path(path).map(|_| path.to_path_buf()))
        .map(|loaded| loaded.is_some())
}

fn optional_env_file(loaded: dotenvy::Result<PathBuf>) -> Result<Option<PathBuf>> {
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(Error::from(e))
            .with_msg("Loading .env file failed")
            .with_stage(Stage::Configuration),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Settings for client `acme` whose dump tool is `sh -c <dump_script>`.
    pub(crate) fn client_yaml(root: &Path, working_dir: &Path, dump_script: &str) -> String {
        format!(
            r#"
databases:
  acme:
    name: acme
    database:
      host: localhost
      username: backup
      password: hunter22
      database: acme_db
    working_dir: {working_dir:?}
    backup_dir:
      default: {root:?}
    log_file: {log:?}
    dump:
      program: sh
      args: ["-c", {dump_script:?}]
      timeout: 10s
"#,
            log = root.join("acme.log"),
        )
    }

    pub(crate) fn test_profile(root: &Path, working_dir: &Path, dump_script: &str) -> ClientProfile {
        Settings::from_yaml_str(&client_yaml(root, working_dir, dump_script))
            .unwrap()
            .resolve("acme")
            .unwrap()
    }

    #[test]
    fn test_resolve_known_client() {
        let temp_dir = TempDir::new().unwrap();
        let profile = test_profile(temp_dir.path(), &temp_dir.path().join("www"), "exit 0");

        assert_eq!(profile.name(), "acme");
        assert_eq!(profile.database().host(), "localhost");
        assert_eq!(profile.database().password().inner(), "hunter22");
        assert_eq!(profile.backup_dir().root(), temp_dir.path());
        assert_eq!(profile.dump().program(), "sh");
        assert_eq!(profile.dump().args(), &vec!["-c".to_string(), "exit 0".to_string()]);
        assert_eq!(profile.dump().timeout(), &Duration::from_secs(10));
    }

    #[test]
    fn test_resolve_numeric_database_fields() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = client_yaml(temp_dir.path(), temp_dir.path(), "exit 0")
            .replace("password: hunter22", "password: 123456")
            .replace("username: backup", "username: 1001")
            .replace("database: acme_db", "database: 2024");
        let profile = Settings::from_yaml_str(&yaml).unwrap().resolve("acme").unwrap();

        assert_eq!(profile.database().password().inner(), "123456");
        assert_eq!(profile.database().username(), "1001");
        assert_eq!(profile.database().database(), "2024");
        assert_eq!(profile.database().host(), "localhost");
    }

    #[test]
    fn test_dump_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = client_yaml(temp_dir.path(), temp_dir.path(), "exit 0");
        let yaml = &yaml[..yaml.find("    dump:").unwrap()];
        let profile = Settings::from_yaml_str(yaml).unwrap().resolve("acme").unwrap();

        assert_eq!(profile.dump().program(), DEFAULT_DUMP_PROGRAM);
        assert_eq!(profile.dump().args(), &vec!["-e", "--opt", "-c"]);
        assert_eq!(profile.dump().timeout(), &DEFAULT_DUMP_TIMEOUT);
    }

    #[test]
    fn test_zero_dump_timeout_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = client_yaml(temp_dir.path(), temp_dir.path(), "exit 0")
            .replace("timeout: 10s", "timeout: 0s");
        let settings = Settings::from_yaml_str(&yaml).unwrap();

        assert_eq!(settings.resolve("acme").unwrap_err().stage(), Some(Stage::Configuration));
    }

    #[test]
    fn test_resolve_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.yml");
        let yaml = client_yaml(temp_dir.path(), &temp_dir.path().join("www"), "exit 0");
        std::fs::write(&config_path, yaml).unwrap();

        let profile = resolve(&config_path, "acme").unwrap();
        assert_eq!(profile.name(), "acme");
    }

    #[test]
    fn test_resolve_unknown_client() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::from_yaml_str(&client_yaml(
            temp_dir.path(),
            temp_dir.path(),
            "exit 0",
        ))
        .unwrap();

        let error = settings.resolve("globex").unwrap_err();
        assert_eq!(error.stage(), Some(Stage::Configuration));
        assert!(error.to_string().contains("globex"));
    }

    #[test]
    fn test_resolve_missing_field() {
        let yaml = r#"
databases:
  acme:
    name: acme
    working_dir: /srv/acme
"#;
        let settings = Settings::from_yaml_str(yaml).unwrap();
        let error = settings.resolve("acme").unwrap_err();
        assert_eq!(error.stage(), Some(Stage::Configuration));
    }

    #[test]
    fn test_resolve_missing_backup_dir_is_not_created() {
        let temp_dir = TempDir::new().unwrap();
        let missing_root = temp_dir.path().join("missing");
        let yaml = client_yaml(&missing_root, temp_dir.path(), "exit 0")
            .replace(&format!("{:?}", missing_root.join("acme.log")), "\"acme.log\"");
        let settings = Settings::from_yaml_str(&yaml).unwrap();

        let error = settings.resolve("acme").unwrap_err();
        assert_eq!(error.stage(), Some(Stage::Configuration));
        assert!(!missing_root.exists());
    }

    #[test]
    fn test_resolve_rejects_unsanitized_name() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = client_yaml(temp_dir.path(), temp_dir.path(), "exit 0")
            .replace("name: acme", "name: \"../acme\"");
        let settings = Settings::from_yaml_str(&yaml).unwrap();

        assert!(settings.resolve("acme").is_err());
    }

    #[test]
    fn test_malformed_sibling_does_not_affect_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let yaml = format!(
            "{}  broken:\n    name: 42\n",
            client_yaml(temp_dir.path(), temp_dir.path(), "exit 0")
        );
        let settings = Settings::from_yaml_str(&yaml).unwrap();

        assert!(settings.resolve("acme").is_ok());
        assert!(settings.resolve("broken").is_err());
        assert_eq!(settings.client_ids().count(), 2);
    }

    #[test]
    fn test_unreadable_config_path() {
        let temp_dir = TempDir::new().unwrap();
        let error = resolve(temp_dir.path().join("nope.yml"), "acme").unwrap_err();
        assert_eq!(error.stage(), Some(Stage::Configuration));
    }

    #[test]
    fn test_load_env_file_missing_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!load_env_file(temp_dir.path().join(".env")).unwrap());
    }

    #[test]
    fn test_load_env_file_sets_variables() {
        let temp_dir = TempDir::new().unwrap();
        let env_path = temp_dir.path().join(".env");
        std::fs::write(&env_path, "CLIENT_BACKUP_TEST_LOADED=acme\n").unwrap();

        assert!(load_env_file(&env_path).unwrap());
        assert_eq!(std::env::var("CLIENT_BACKUP_TEST_LOADED").unwrap(), "acme");
    }

    #[test]
    fn test_load_env_file_malformed_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let env_path = temp_dir.path().join(".env");
        std::fs::write(&env_path, "CLIENT_BACKUP_TEST_BROKEN acme\n").unwrap();

        let error = load_env_file(&env_path).unwrap_err();
        assert_eq!(error.stage(), Some(Stage::Configuration));
        assert!(error.to_string().contains("CLIENT_BACKUP_TEST_BROKEN"));
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let temp_dir = TempDir::new().unwrap();
        let profile = test_profile(temp_dir.path(), temp_dir.path(), "exit 0");
        let debug_str = format!("{:?}", profile);
        assert!(!debug_str.contains("hunter22"));
    }
}
