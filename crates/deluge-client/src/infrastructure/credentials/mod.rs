//! Discovery of the daemon's local-client credentials.
//!
//! A daemon writes an `auth` file into its config directory with one account
//! per line:
//!
//! ```text
//! # username:password:level
//! localclient:8f1d3c2a9b6e4f70:10
//! alice:hunter2:5
//! ```
//!
//! The `localclient` account exists so that programs on the same machine
//! can log in without the user typing a password.  The client reads it only
//! when it connects to a loopback host and was given no credentials.
//!
//! File locations:
//! - Windows:    `%APPDATA%\deluge\auth`
//! - elsewhere:  `~/.config/deluge/auth`

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Account name the daemon creates for same-host clients.
pub const LOCAL_CLIENT_USER: &str = "localclient";

/// Errors raised while reading the auth file.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The platform auth file location could not be determined.
    #[error("could not determine the daemon config directory")]
    NoConfigDir,

    #[error("I/O error reading auth file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A username/password pair for `daemon.login`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<password hidden>")
            .finish()
    }
}

/// `true` for the host names that always mean "this machine".
pub fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Platform location of the daemon's `auth` file.
pub fn default_auth_file() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("deluge").join("auth"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join(".config")
                .join("deluge")
                .join("auth")
        })
    }
}

/// Finds the `localclient` entry in auth-file text.
///
/// Blank lines, `#` comments and lines with fewer than two `:`-separated
/// fields are skipped.  The first matching entry wins.
pub fn parse_auth_file(contents: &str) -> Option<Credentials> {
    contents
        .lines()
        .map(|line| line.trim_end_matches(['\r', '\n']))
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(':');
            let username = fields.next()?;
            let password = fields.next()?;
            Some((username, password))
        })
        .find(|(username, _)| *username == LOCAL_CLIENT_USER)
        .map(|(username, password)| Credentials::new(username, password))
}

/// Reads the `localclient` entry from the auth file at `path`.
///
/// A missing file is not an error and yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`CredentialsError::Io`] for any other read failure.
pub fn read_local_credentials(path: &Path) -> Result<Option<Credentials>, CredentialsError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(parse_auth_file(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CredentialsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Decides which credentials to log in with.
///
/// Explicit credentials are used as given.  With none given and a loopback
/// `host`, the `localclient` entry is read from `auth_file` (or the platform
/// default location).  If that fails the result is empty credentials, which
/// the daemon will reject at login with a clear remote error.
pub fn resolve(host: &str, explicit: &Credentials, auth_file: Option<&Path>) -> Credentials {
    if !explicit.is_empty() || !is_loopback(host) {
        return explicit.clone();
    }

    let path = match auth_file.map(Path::to_path_buf).or_else(default_auth_file) {
        Some(path) => path,
        None => {
            warn!(error = %CredentialsError::NoConfigDir, "local credentials unavailable");
            return Credentials::default();
        }
    };

    match read_local_credentials(&path) {
        Ok(Some(found)) => {
            debug!(path = %path.display(), "using local client credentials");
            found
        }
        Ok(None) => {
            debug!(path = %path.display(), "no local client entry found");
            Credentials::default()
        }
        Err(e) => {
            warn!(error = %e, "local credentials unavailable");
            Credentials::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const SAMPLE: &str = "\
# Deluge auth file
alice:hunter2:5

localclient:8f1d3c2a9b6e4f70:10
localclient:second:10
";

    #[test]
    fn test_parse_picks_first_localclient_entry() {
        // Arrange / Act
        let creds = parse_auth_file(SAMPLE);

        // Assert
        assert_eq!(creds, Some(Credentials::new("localclient", "8f1d3c2a9b6e4f70")));
    }

    #[test]
    fn test_parse_entry_without_level() {
        let creds = parse_auth_file("localclient:pw\r\n");
        assert_eq!(creds, Some(Credentials::new("localclient", "pw")));
    }

    #[test]
    fn test_parse_skips_comments_and_short_lines() {
        let creds = parse_auth_file("#localclient:commented:10\nlocalclient\n");
        assert_eq!(creds, None);
    }

    #[test]
    fn test_parse_without_localclient_is_none() {
        assert_eq!(parse_auth_file("alice:pw:10\n"), None);
    }

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback("localhost"));
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(!is_loopback("192.168.1.10"));
        assert!(!is_loopback("seedbox.example.org"));
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("localclient", "s3cret"));
        assert!(rendered.contains("localclient"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_resolve_keeps_explicit_credentials() {
        let explicit = Credentials::new("alice", "pw");
        let resolved = resolve("localhost", &explicit, Some(Path::new("/nonexistent/auth")));
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn test_resolve_ignores_auth_file_for_remote_host() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("deluge_auth_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("auth");
        std::fs::write(&path, SAMPLE).unwrap();

        // Act
        let resolved = resolve("10.0.0.5", &Credentials::default(), Some(&path));

        // Assert
        assert!(resolved.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_reads_auth_file_for_loopback() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("deluge_auth_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("auth");
        std::fs::write(&path, SAMPLE).unwrap();

        // Act
        let resolved = resolve("127.0.0.1", &Credentials::default(), Some(&path));

        // Assert
        assert_eq!(resolved, Credentials::new("localclient", "8f1d3c2a9b6e4f70"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_missing_file_gives_empty_credentials() {
        let resolved = resolve(
            "::1",
            &Credentials::default(),
            Some(Path::new("/nonexistent/deluge/auth")),
        );
        assert!(resolved.is_empty());
    }
}
