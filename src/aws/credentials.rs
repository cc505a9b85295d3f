//! Credential store
//!
//! Credentials are loaded from a line-oriented `KEY=VALUE` file:
//!
//! ```text
//! AWSAccessKeyId=AKIA...
//! AWSSecretKey=...
//! ```
//!
//! The file path comes from the `-I` flag, the `AWS_CREDENTIAL_FILE`
//! environment variable, or `~/.awscred`, in that order. Credentials can
//! be swapped at runtime (`cred -F`); the session invalidates all open
//! connections when that happens.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use aws_credential_types::Credentials;

pub const ACCESS_KEY_ID: &str = "AWSAccessKeyId";
pub const SECRET_KEY: &str = "AWSSecretKey";

const ENV_CREDENTIAL_FILE: &str = "AWS_CREDENTIAL_FILE";
const DEFAULT_CREDENTIAL_FILE: &str = ".awscred";

#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub key_id: String,
    pub secret: String,
    /// Where the keys came from.
    pub source_file: Option<PathBuf>,
    /// User-assigned label, shown by `cred -l`.
    pub name: Option<String>,
}

impl AwsCredentials {
    /// Parse a credentials file. Lines without `=` are ignored; a file
    /// missing either recognized key is an error naming it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to access {}", path.display()))?;
        let mut key_id = None;
        let mut secret = None;
        for line in contents.lines() {
            let Some((key, value)) = line.trim_end().split_once('=') else {
                continue;
            };
            match key {
                ACCESS_KEY_ID => key_id = Some(value.to_string()),
                SECRET_KEY => secret = Some(value.to_string()),
                _ => {}
            }
        }
        let Some(key_id) = key_id else {
            bail!("File {} missing {}", path.display(), ACCESS_KEY_ID);
        };
        let Some(secret) = secret else {
            bail!("File {} missing {}", path.display(), SECRET_KEY);
        };
        Ok(Self {
            key_id,
            secret,
            source_file: Some(path.to_path_buf()),
            name: None,
        })
    }

    /// Resolve the credentials file path: explicit flag, then the
    /// environment override, then `~/.awscred`.
    pub fn resolve_path(flag: Option<PathBuf>) -> PathBuf {
        if let Some(path) = flag {
            return path;
        }
        if let Ok(path) = std::env::var(ENV_CREDENTIAL_FILE) {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CREDENTIAL_FILE)
    }

    /// The SDK-side credential value; clients are bound to this at
    /// construction time.
    pub fn provider(&self) -> Credentials {
        Credentials::from_keys(self.key_id.clone(), self.secret.clone(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_cred_file(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("awscred");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_both_keys_and_ignores_noise() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cred_file(
            &dir,
            "# comment without equals\nAWSAccessKeyId=AKIAEXAMPLE\nOther=thing\nAWSSecretKey=s3cr3t\n",
        );
        let creds = AwsCredentials::from_file(&path).unwrap();
        assert_eq!(creds.key_id, "AKIAEXAMPLE");
        assert_eq!(creds.secret, "s3cr3t");
        assert_eq!(creds.source_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn missing_key_names_the_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cred_file(&dir, "AWSAccessKeyId=AKIAEXAMPLE\n");
        let err = AwsCredentials::from_file(&path).unwrap_err();
        assert!(err.to_string().contains(SECRET_KEY));

        let path = write_cred_file(&dir, "AWSSecretKey=s3cr3t\n");
        let err = AwsCredentials::from_file(&path).unwrap_err();
        assert!(err.to_string().contains(ACCESS_KEY_ID));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let err = AwsCredentials::from_file(Path::new("/nonexistent/awscred")).unwrap_err();
        assert!(err.to_string().contains("Unable to access"));
    }

    #[test]
    fn flag_wins_over_default_path() {
        let explicit = PathBuf::from("/tmp/other-creds");
        assert_eq!(
            AwsCredentials::resolve_path(Some(explicit.clone())),
            explicit
        );
    }

    #[test]
    fn secret_value_may_contain_equals() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cred_file(&dir, "AWSAccessKeyId=AKIA\nAWSSecretKey=abc=def==\n");
        let creds = AwsCredentials::from_file(&path).unwrap();
        assert_eq!(creds.secret, "abc=def==");
    }
}
