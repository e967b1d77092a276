use std::{
    env,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use regex::{Captures, Regex};
use tracing::error;

use crate::manifest::core::Manifest;

pub const YAML_CONFIG_NAME: &str = "pgsink.yaml";

#[derive(thiserror::Error, Debug)]
pub enum SubstituteEnvVariablesError {
    #[error("Environment variable {0} not found")]
    MissingVariable(String),

    #[error("{0}")]
    Regex(#[from] regex::Error),
}

fn substitute_env_variables(contents: &str) -> Result<String, SubstituteEnvVariablesError> {
    let re = Regex::new(r"\$\{([^}]+)\}")?;

    if let Some(missing) = re
        .captures_iter(contents)
        .map(|caps| caps[1].to_string())
        .find(|name| env::var(name).is_err())
    {
        error!("Environment variable {} not found", missing);
        return Err(SubstituteEnvVariablesError::MissingVariable(missing));
    }

    let result = re.replace_all(contents, |caps: &Captures| env::var(&caps[1]).unwrap_or_default());
    Ok(result.into_owned())
}

#[derive(thiserror::Error, Debug)]
pub enum ValidateManifestError {
    #[error("Manifest name can not be empty")]
    EmptyName,

    #[error("writer.batch_size must be greater than 0")]
    ZeroBatchSize,

    #[error("postgres.schema can not be empty when set")]
    EmptySchema,
}

fn validate_manifest(manifest: &Manifest) -> Result<(), ValidateManifestError> {
    if manifest.name.trim().is_empty() {
        return Err(ValidateManifestError::EmptyName);
    }

    if manifest.writer.batch_size == 0 {
        return Err(ValidateManifestError::ZeroBatchSize);
    }

    if manifest.postgres.schema.as_deref().is_some_and(|schema| schema.trim().is_empty()) {
        return Err(ValidateManifestError::EmptySchema);
    }

    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum ReadManifestError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse manifest: {0}")]
    CouldNotParseManifest(#[from] serde_yaml::Error),

    #[error("Could not substitute env variables: {0}")]
    CouldNotSubstituteEnvVariables(#[from] SubstituteEnvVariablesError),

    #[error("Could not validate manifest: {0}")]
    CouldNotValidateManifest(#[from] ValidateManifestError),
}

/// Reads `pgsink.yaml`, loading a `.env` next to it before substituting `${VAR}` placeholders.
pub fn read_manifest(file_path: &PathBuf) -> Result<Manifest, ReadManifestError> {
    let mut file = File::open(file_path)?;
    let mut contents = String::new();

    file.read_to_string(&mut contents)?;

    if let Some(project_path) = file_path.parent() {
        load_env_from_project_path(project_path);
    }

    let contents = substitute_env_variables(&contents)?;
    let manifest: Manifest = serde_yaml::from_str(&contents)?;

    validate_manifest(&manifest)?;

    Ok(manifest)
}

fn load_env_from_project_path(project_path: &Path) {
    let env_file = project_path.join(".env");
    if env_file.exists() {
        dotenv::from_path(&env_file).ok();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_manifest(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(YAML_CONFIG_NAME);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults_applied() {
        let (_dir, path) = write_manifest("name: my_sync\n");
        let manifest = read_manifest(&path).unwrap();

        assert_eq!(manifest.name, "my_sync");
        assert_eq!(manifest.writer.batch_size, 10_000);
        assert_eq!(manifest.writer.identity_salt, "");
        assert_eq!(manifest.postgres.connection_string, None);
        assert!(!manifest.postgres.disable_ssl());
    }

    #[test]
    fn test_env_variables_substituted() {
        env::set_var("PGSINK_TEST_SALT", "run-42");
        let (_dir, path) = write_manifest(concat!(
            "name: my_sync\n",
            "postgres:\n  schema: sync\n  disable_ssl: true\n",
            "writer:\n  batch_size: 50\n  identity_salt: ${PGSINK_TEST_SALT}\n",
        ));

        let manifest = read_manifest(&path).unwrap();
        let settings = manifest.writer_settings();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.identity_salt, "run-42");
        assert_eq!(manifest.postgres.schema.as_deref(), Some("sync"));
        assert!(manifest.postgres.disable_ssl());
    }

    #[test]
    fn test_env_file_next_to_manifest_is_loaded() {
        let (dir, path) = write_manifest(
            "name: my_sync\nwriter:\n  identity_salt: ${PGSINK_TEST_ENV_FILE_SALT}\n",
        );
        std::fs::write(dir.path().join(".env"), "PGSINK_TEST_ENV_FILE_SALT=from-env-file\n")
            .unwrap();

        let manifest = read_manifest(&path).unwrap();
        assert_eq!(manifest.writer.identity_salt, "from-env-file");
    }

    #[test]
    fn test_missing_env_variable_is_an_error() {
        let (_dir, path) = write_manifest(
            "name: my_sync\nwriter:\n  identity_salt: ${PGSINK_TEST_NOT_SET_ANYWHERE}\n",
        );

        match read_manifest(&path).unwrap_err() {
            ReadManifestError::CouldNotSubstituteEnvVariables(
                SubstituteEnvVariablesError::MissingVariable(name),
            ) => assert_eq!(name, "PGSINK_TEST_NOT_SET_ANYWHERE"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let (_dir, path) = write_manifest("name: my_sync\nwriter:\n  batch_size: 0\n");

        assert!(matches!(
            read_manifest(&path).unwrap_err(),
            ReadManifestError::CouldNotValidateManifest(ValidateManifestError::ZeroBatchSize)
        ));
    }

    #[test]
    fn test_empty_name_and_schema_rejected() {
        let (_dir, path) = write_manifest("name: \"  \"\n");
        assert!(matches!(
            read_manifest(&path).unwrap_err(),
            ReadManifestError::CouldNotValidateManifest(ValidateManifestError::EmptyName)
        ));

        let (_dir, path) = write_manifest("name: my_sync\npostgres:\n  schema: \"\"\n");
        assert!(matches!(
            read_manifest(&path).unwrap_err(),
            ReadManifestError::CouldNotValidateManifest(ValidateManifestError::EmptySchema)
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_manifest(&dir.path().join(YAML_CONFIG_NAME)).unwrap_err(),
            ReadManifestError::CouldNotOpenFile(_)
        ));
    }
}
