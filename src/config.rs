//! Start-up configuration: the repository allowlist and the GitHub token.
//!
//! Both are loaded once in `main` and frozen into a [`GateConfig`]. Changing
//! either requires a restart.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::operation::RepoRef;

pub const DEFAULT_CONFIG_PATH: &str = "config/allowed_repos.json";
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowlistFile {
    allowed_repos: Vec<String>,
}

/// Case-insensitive set of `owner/repo` pairs the server may touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    repos: HashSet<String>,
}

impl Allowlist {
    /// Load the allowlist from a JSON file.
    ///
    /// Fails closed: an unreadable or malformed file yields an empty
    /// allowlist, so every repository is forbidden.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(allowlist) => {
                tracing::info!(
                    path = %path.display(),
                    count = allowlist.len(),
                    "Loaded allowed repositories"
                );
                allowlist
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load allowed repositories config"
                );
                tracing::error!("Server will run in read-only mode with no repository access");
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let file: AllowlistFile = serde_json::from_str(text)?;
        Ok(Self::from_repos(file.allowed_repos))
    }

    pub fn from_repos<I, S>(repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for entry in repos {
            let entry = entry.as_ref();
            match normalize_entry(entry) {
                Some(key) => {
                    set.insert(key);
                }
                None => {
                    tracing::warn!(entry, "Skipping allowlist entry not in owner/repo form");
                }
            }
        }
        Self { repos: set }
    }

    pub fn is_allowed(&self, owner: &str, repo: &str) -> bool {
        self.contains(&RepoRef::new(owner, repo))
    }

    pub fn contains(&self, repo: &RepoRef) -> bool {
        self.repos.contains(&repo.allow_key())
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Sorted, normalized entries.
    pub fn repos(&self) -> Vec<String> {
        let mut repos: Vec<String> = self.repos.iter().cloned().collect();
        repos.sort();
        repos
    }
}

fn normalize_entry(entry: &str) -> Option<String> {
    let entry = entry.trim();
    let (owner, repo) = entry.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some(entry.to_lowercase())
}

/// GitHub bearer token. Never printed.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Wrap a token; blank tokens count as no token.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Pick the explicit token if given, otherwise the environment value.
    pub fn from_sources(explicit: Option<String>, env_value: Option<String>) -> Option<Self> {
        explicit
            .and_then(Self::new)
            .or_else(|| env_value.and_then(Self::new))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Immutable process-wide configuration handed to the mediator.
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    allowlist: Allowlist,
    credential: Option<Credential>,
}

impl GateConfig {
    pub fn new(allowlist: Allowlist, credential: Option<Credential>) -> Self {
        Self {
            allowlist,
            credential,
        }
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn can_write(&self) -> bool {
        self.credential.is_some()
    }

    /// Log the effective access mode once at start-up.
    pub fn log_access_mode(&self) {
        if self.can_write() {
            tracing::info!("Running with GitHub token - full read/write access enabled");
        } else {
            tracing::warn!("Running in read-only mode (no GITHUB_TOKEN); write tools will return unauthorized");
        }
        if self.allowlist.is_empty() {
            tracing::warn!("Allowlist is empty; every repository will be rejected");
        } else {
            tracing::info!(repos = ?self.allowlist.repos(), "Repository allowlist active");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(r#"{"allowedRepos": ["octocat/Hello-World", "rust-lang/rust"]}"#);
        let allowlist = Allowlist::load(file.path());
        assert_eq!(allowlist.len(), 2);
        assert_eq!(
            allowlist.repos(),
            vec!["octocat/hello-world".to_string(), "rust-lang/rust".to_string()]
        );
    }

    #[test]
    fn test_load_missing_file_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let allowlist = Allowlist::load(&dir.path().join("absent.json"));
        assert!(allowlist.is_empty());
        assert!(!allowlist.is_allowed("octocat", "hello-world"));
    }

    #[test]
    fn test_load_malformed_json_fails_closed() {
        let file = write_config("{ allowedRepos: [octocat/hello-world");
        assert!(Allowlist::load(file.path()).is_empty());
    }

    #[test]
    fn test_load_missing_field_fails_closed() {
        let file = write_config(r#"{"repos": ["octocat/hello-world"]}"#);
        assert!(Allowlist::load(file.path()).is_empty());
    }

    #[test]
    fn test_load_non_array_field_fails_closed() {
        let file = write_config(r#"{"allowedRepos": "octocat/hello-world"}"#);
        assert!(Allowlist::load(file.path()).is_empty());
    }

    #[test]
    fn test_from_json_reports_parse_error() {
        assert!(matches!(
            Allowlist::from_json("[]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_membership_is_case_insensitive() {
        let allowlist = Allowlist::from_repos(["octocat/hello-world"]);
        assert!(allowlist.is_allowed("octocat", "hello-world"));
        assert!(allowlist.is_allowed("Octocat", "Hello-World"));
        assert!(allowlist.contains(&RepoRef::new("OCTOCAT", "HELLO-WORLD")));
        assert!(!allowlist.is_allowed("octocat", "other"));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let allowlist = Allowlist::from_repos([
            "  octocat/hello-world  ",
            "no-slash",
            "/repo",
            "owner/",
            "a/b/c",
        ]);
        assert_eq!(allowlist.repos(), vec!["octocat/hello-world".to_string()]);
    }

    #[test]
    fn test_credential_rejects_blank_tokens() {
        assert!(Credential::new("").is_none());
        assert!(Credential::new("   ").is_none());
        assert_eq!(Credential::new("ghp_abc").unwrap().expose(), "ghp_abc");
    }

    #[test]
    fn test_credential_source_precedence() {
        let cred = Credential::from_sources(Some("flag".into()), Some("env".into())).unwrap();
        assert_eq!(cred.expose(), "flag");

        let cred = Credential::from_sources(None, Some("env".into())).unwrap();
        assert_eq!(cred.expose(), "env");

        let cred = Credential::from_sources(Some(String::new()), Some("env".into())).unwrap();
        assert_eq!(cred.expose(), "env");

        assert!(Credential::from_sources(None, None).is_none());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = Credential::new("ghp_secret").unwrap();
        assert_eq!(format!("{:?}", cred), "Credential(***)");
    }

    #[test]
    fn test_gate_config_write_capability() {
        assert!(!GateConfig::default().can_write());
        let config = GateConfig::new(Allowlist::default(), Credential::new("t"));
        assert!(config.can_write());
    }
}
