//! Session manager (spec §4.5): per-login-server YAML session files under a
//! user config directory, one file per logical login host. Hostnames are
//! derived by stripping any URL scheme; the session state itself is a
//! `read-modify-write` guarded by a single exclusive file lock per
//! operation (spec §5 "Session file: one lock per manager").

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use thand_core::model::{first_active_session, LocalSession};
use thand_core::error::ThandError;

const SCHEMA_VERSION: &str = "1.0";
const POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);
const DEFAULT_AWAIT_DEADLINE: StdDuration = StdDuration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    sessions: HashMap<String, LocalSession>,
}

impl Default for SessionFile {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            timestamp: Utc::now(),
            sessions: HashMap::new(),
        }
    }
}

/// Strips any `scheme://` prefix and path/query suffix, keeping only the
/// host, so `https://github.com/foo` and `github.com` key the same file.
fn host_key(server: &str) -> String {
    let without_scheme = server.split("://").next_back().unwrap_or(server);
    without_scheme.split('/').next().unwrap_or(without_scheme).to_string()
}

fn io_err(e: std::io::Error) -> ThandError {
    ThandError::validation(format!("session file I/O failed: {e}"))
}

/// Manages per-login-server session files under `dir` (spec §6:
/// `~/.config/thand/<hostname>.yaml`, mode 0600).
pub struct SessionManager {
    dir: PathBuf,
}

impl SessionManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolves the default session directory, honoring `XDG_CONFIG_HOME`.
    pub fn default_dir() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            if !xdg.is_empty() {
                return PathBuf::from(xdg).join("thand");
            }
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config").join("thand")
    }

    fn path_for(&self, server: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", host_key(server)))
    }

    /// Opens (create-if-missing, owner-only permissions) and holds an
    /// exclusive lock across `f`'s read-modify-write.
    fn with_locked_file<T>(
        &self,
        server: &str,
        f: impl FnOnce(&mut File) -> Result<T, ThandError>,
    ) -> Result<T, ThandError> {
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let path = self.path_for(server);

        let mut open_options = OpenOptions::new();
        open_options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            open_options.mode(0o600);
        }
        let mut file = open_options
            .open(&path)
            .map_err(|e| ThandError::validation(format!("failed to open session file {path:?}: {e}")))?;
        file.lock_exclusive()
            .map_err(|e| ThandError::validation(format!("failed to lock session file {path:?}: {e}")))?;
        let result = f(&mut file);
        let _ = FileExt::unlock(&file);
        result
    }

    fn load_locked(file: &mut File) -> Result<SessionFile, ThandError> {
        let mut text = String::new();
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        file.read_to_string(&mut text).map_err(io_err)?;
        if text.trim().is_empty() {
            return Ok(SessionFile::default());
        }
        serde_yaml::from_str(&text)
            .map_err(|e| ThandError::validation(format!("malformed session file: {e}")))
    }

    fn commit_locked(file: &mut File, contents: &SessionFile) -> Result<(), ThandError> {
        let text = serde_yaml::to_string(contents)
            .map_err(|e| ThandError::validation(format!("failed to serialize session file: {e}")))?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        file.set_len(0).map_err(io_err)?;
        file.write_all(text.as_bytes()).map_err(io_err)?;
        Ok(())
    }

    pub fn get(&self, server: &str, provider: &str) -> Result<Option<LocalSession>, ThandError> {
        self.with_locked_file(server, |file| {
            Ok(Self::load_locked(file)?.sessions.get(provider).cloned())
        })
    }

    pub fn add(&self, server: &str, provider: &str, session: LocalSession) -> Result<(), ThandError> {
        self.with_locked_file(server, |file| {
            let mut contents = Self::load_locked(file)?;
            contents.sessions.insert(provider.to_string(), session);
            contents.timestamp = Utc::now();
            Self::commit_locked(file, &contents)
        })
    }

    pub fn remove(&self, server: &str, provider: &str) -> Result<(), ThandError> {
        self.with_locked_file(server, |file| {
            let mut contents = Self::load_locked(file)?;
            contents.sessions.remove(provider);
            contents.timestamp = Utc::now();
            Self::commit_locked(file, &contents)
        })
    }

    /// First non-expired session matching `providers` (empty = any),
    /// preserving no particular order beyond the file's own map iteration
    /// (spec §4.5, §8 invariant 5).
    pub fn first_active_session(
        &self,
        server: &str,
        providers: &[String],
    ) -> Result<LocalSession, ThandError> {
        self.with_locked_file(server, |file| {
            let contents = Self::load_locked(file)?;
            let sessions: Vec<LocalSession> = contents.sessions.into_values().collect();
            first_active_session(&sessions, providers, Utc::now()).cloned()
        })
    }

    /// Polls `server`'s file at [`POLL_INTERVAL`] looking for a file
    /// timestamp strictly newer than `since`. Returns `None` on
    /// cancellation or once `deadline` (default 5 minutes) elapses -
    /// absence of a refresh is an observable outcome, not an error (spec
    /// §4.5).
    pub async fn await_refresh(
        &self,
        server: &str,
        since: DateTime<Utc>,
        mut cancel: tokio::sync::watch::Receiver<bool>,
        deadline: Option<StdDuration>,
    ) -> Option<HashMap<String, LocalSession>> {
        self.poll_until(server, deadline, &mut cancel, |contents| {
            (contents.timestamp > since).then(|| contents.sessions.clone())
        })
        .await
    }

    /// As [`Self::await_refresh`], but additionally requires `provider`'s
    /// session to be present once the timestamp advances.
    pub async fn await_provider_refresh(
        &self,
        server: &str,
        provider: &str,
        since: DateTime<Utc>,
        mut cancel: tokio::sync::watch::Receiver<bool>,
        deadline: Option<StdDuration>,
    ) -> Option<LocalSession> {
        self.poll_until(server, deadline, &mut cancel, |contents| {
            if contents.timestamp <= since {
                return None;
            }
            contents.sessions.get(provider).cloned()
        })
        .await
    }

    async fn poll_until<T>(
        &self,
        server: &str,
        deadline: Option<StdDuration>,
        cancel: &mut tokio::sync::watch::Receiver<bool>,
        mut ready: impl FnMut(&SessionFile) -> Option<T>,
    ) -> Option<T> {
        let deadline = deadline.unwrap_or(DEFAULT_AWAIT_DEADLINE);
        let deadline_at = tokio::time::Instant::now() + deadline;

        loop {
            if let Ok(contents) = self.with_locked_file(server, Self::load_locked) {
                if let Some(value) = ready(&contents) {
                    return Some(value);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep_until(deadline_at) => return None,
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return None;
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            if tokio::time::Instant::now() >= deadline_at {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn session(provider: &str, expiry: DateTime<Utc>) -> LocalSession {
        LocalSession {
            uuid: Uuid::new_v4(),
            user: "u@example.com".into(),
            access_token: "token".into(),
            refresh_token: None,
            expiry,
            endpoint: "https://example.com".into(),
            provider: provider.into(),
        }
    }

    /// Removes its directory on drop so tests don't leak scratch files.
    struct ScratchDir(PathBuf);
    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn manager() -> (SessionManager, ScratchDir) {
        let dir = std::env::temp_dir().join(format!("thand-session-test-{}", Uuid::new_v4()));
        (SessionManager::new(dir.clone()), ScratchDir(dir))
    }

    #[test]
    fn add_then_get_round_trips() {
        let (mgr, _dir) = manager();
        let s = session("aws-prod", Utc::now() + ChronoDuration::hours(1));
        mgr.add("github.com", "aws-prod", s.clone()).unwrap();
        let got = mgr.get("github.com", "aws-prod").unwrap().unwrap();
        assert_eq!(got.uuid, s.uuid);
    }

    #[test]
    fn url_scheme_and_path_are_stripped_from_the_hostname() {
        let (mgr, _dir) = manager();
        let s = session("aws-prod", Utc::now() + ChronoDuration::hours(1));
        mgr.add("https://github.com/org/repo", "aws-prod", s.clone()).unwrap();
        let got = mgr.get("github.com", "aws-prod").unwrap().unwrap();
        assert_eq!(got.uuid, s.uuid);
    }

    #[test]
    fn remove_drops_the_session() {
        let (mgr, _dir) = manager();
        let s = session("aws-prod", Utc::now() + ChronoDuration::hours(1));
        mgr.add("github.com", "aws-prod", s).unwrap();
        mgr.remove("github.com", "aws-prod").unwrap();
        assert!(mgr.get("github.com", "aws-prod").unwrap().is_none());
    }

    #[test]
    fn first_active_session_skips_expired() {
        let (mgr, _dir) = manager();
        mgr.add("github.com", "okta", session("okta", Utc::now() - ChronoDuration::minutes(1))).unwrap();
        mgr.add("github.com", "aws-prod", session("aws-prod", Utc::now() + ChronoDuration::hours(1))).unwrap();
        let found = mgr.first_active_session("github.com", &["aws-prod".to_string()]).unwrap();
        assert_eq!(found.provider, "aws-prod");
    }

    #[tokio::test]
    async fn await_refresh_returns_none_on_cancellation() {
        let (mgr, _dir) = manager();
        let (tx, rx) = tokio::sync::watch::channel(false);
        let since = Utc::now();
        let wait = tokio::spawn(async move {
            mgr_await(mgr, since, rx).await
        });
        tx.send(true).unwrap();
        assert!(wait.await.unwrap().is_none());
    }

    async fn mgr_await(
        mgr: SessionManager,
        since: DateTime<Utc>,
        rx: tokio::sync::watch::Receiver<bool>,
    ) -> Option<HashMap<String, LocalSession>> {
        mgr.await_refresh("github.com", since, rx, Some(StdDuration::from_secs(2))).await
    }
}
