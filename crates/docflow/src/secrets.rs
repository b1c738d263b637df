//! Credentials for the extraction provider.
//!
//! The API key can come from the config itself, a file (for mounted secrets)
//! or an environment variable. When several are configured the first one in
//! that order wins; the others are not consulted.

use std::path::PathBuf;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret configured (set a value, a file or an environment variable)")]
    NoSourceProvided,

    #[error("Cannot read secret file '{}': {source}", .path.display())]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },

    #[error("Environment variable '{name}' is not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' is not valid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a secret is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource<'a> {
    Inline(&'a str),
    File(&'a str),
    EnvVar(&'a str),
}

impl<'a> SecretSource<'a> {
    /// Picks the first configured source; blank entries count as unset.
    pub fn first_of(
        inline: Option<&'a str>,
        file: Option<&'a str>,
        env_var: Option<&'a str>,
    ) -> Option<Self> {
        let set = |v: Option<&'a str>| v.filter(|s| !s.trim().is_empty());
        set(inline)
            .map(SecretSource::Inline)
            .or_else(|| set(file).map(SecretSource::File))
            .or_else(|| set(env_var).map(SecretSource::EnvVar))
    }

    /// Description safe to log; never contains the secret.
    pub fn describe(&self) -> String {
        match self {
            SecretSource::Inline(_) => "inline config value".to_string(),
            SecretSource::File(path) => format!("file {}", path),
            SecretSource::EnvVar(name) => format!("environment variable {}", name),
        }
    }

    /// Reads the secret. Surrounding whitespace is stripped.
    pub fn load(&self) -> Result<SecretString> {
        let raw = match *self {
            SecretSource::Inline(value) => value.to_string(),
            SecretSource::File(path) => {
                let path = expand_home(path);
                std::fs::read_to_string(&path).map_err(|e| SecretError::FileReadError {
                    path: PathBuf::from(&path),
                    source: e,
                })?
            }
            SecretSource::EnvVar(name) => std::env::var(name).map_err(|e| match e {
                std::env::VarError::NotPresent => SecretError::EnvVarNotSet {
                    name: name.to_string(),
                },
                std::env::VarError::NotUnicode(_) => SecretError::EnvVarNotUnicode {
                    name: name.to_string(),
                },
            })?,
        };

        let value = raw.trim();
        if value.is_empty() {
            return Err(SecretError::Empty {
                origin: self.describe(),
            });
        }
        Ok(SecretString::from(value.to_string()))
    }
}

/// Resolves a secret from the first configured source.
pub fn resolve_secret(
    inline: Option<&str>,
    file: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    let source =
        SecretSource::first_of(inline, file, env_var).ok_or(SecretError::NoSourceProvided)?;
    let secret = source.load()?;
    log::debug!("Loaded secret from {}", source.describe());
    Ok(secret)
}

/// Like [`resolve_secret`], but nothing configured, or an unset environment
/// variable, gives `None`. A configured file that cannot be read is still an
/// error.
pub fn resolve_secret_optional(
    inline: Option<&str>,
    file: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(inline, file, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided | SecretError::EnvVarNotSet { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// `~` and `~/...` resolve against the home directory; anything else is
/// returned unchanged.
pub(crate) fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home.to_string_lossy().into_owned(),
        Some(home) => home.join(rest).to_string_lossy().into_owned(),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_source_order() {
        assert_eq!(
            SecretSource::first_of(Some("k"), Some("/f"), Some("VAR")),
            Some(SecretSource::Inline("k"))
        );
        assert_eq!(
            SecretSource::first_of(Some(" "), Some("/f"), Some("VAR")),
            Some(SecretSource::File("/f"))
        );
        assert_eq!(
            SecretSource::first_of(None, None, Some("VAR")),
            Some(SecretSource::EnvVar("VAR"))
        );
        assert_eq!(SecretSource::first_of(None, Some(""), None), None);
    }

    #[test]
    fn test_describe_hides_value() {
        assert!(!SecretSource::Inline("sk-live").describe().contains("sk-live"));
    }

    #[test]
    #[serial]
    fn test_file_wins_over_env() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();
        std::env::set_var("DOCFLOW_TEST_KEY_A", "from-env");

        let secret = resolve_secret(
            None,
            Some(file.path().to_str().unwrap()),
            Some("DOCFLOW_TEST_KEY_A"),
        )
        .unwrap();
        std::env::remove_var("DOCFLOW_TEST_KEY_A");
        assert_eq!(secret.expose_secret(), "from-file");
    }

    #[test]
    #[serial]
    fn test_env_value_is_trimmed() {
        std::env::set_var("DOCFLOW_TEST_KEY_B", "  from-env\n");
        let secret = resolve_secret(None, None, Some("DOCFLOW_TEST_KEY_B")).unwrap();
        std::env::remove_var("DOCFLOW_TEST_KEY_B");
        assert_eq!(secret.expose_secret(), "from-env");
    }

    #[test]
    fn test_file_errors() {
        assert!(matches!(
            resolve_secret(None, Some("/nonexistent/docflow/secret"), None),
            Err(SecretError::FileReadError { .. })
        ));

        let empty = NamedTempFile::new().unwrap();
        assert!(matches!(
            resolve_secret(None, Some(empty.path().to_str().unwrap()), None),
            Err(SecretError::Empty { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_optional_resolution() {
        std::env::remove_var("DOCFLOW_TEST_KEY_UNSET");
        assert!(resolve_secret_optional(None, None, Some("DOCFLOW_TEST_KEY_UNSET"))
            .unwrap()
            .is_none());
        assert!(resolve_secret_optional(None, None, None).unwrap().is_none());
        assert!(resolve_secret_optional(None, Some("/nonexistent/docflow/secret"), None).is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/srv/docflow"), "/srv/docflow");
        assert_eq!(expand_home("data"), "data");
        assert_eq!(expand_home("~other/x"), "~other/x");

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/docflow"), home.join("docflow").to_string_lossy());
            assert_eq!(expand_home("~"), home.to_string_lossy());
        }
    }
}
