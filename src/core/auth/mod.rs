use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};

/// Fixed `${user_type}` for offline sessions.
pub const USER_TYPE: &str = "legacy";

/// The player record the launcher starts the game for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub username: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub client_token: Option<String>,
}

impl UserSession {
    pub fn offline(username: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            ..Self::default()
        }
    }

    /// `"Player"` when the record carries no usable name.
    pub fn display_name(&self) -> &str {
        let trimmed = self.username.trim();
        if trimmed.is_empty() {
            "Player"
        } else {
            trimmed
        }
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }
}

/// Where regenerated tokens are written back.
pub trait TokenStore: Send + Sync {
    fn persist(&self, session: &UserSession) -> LauncherResult<()>;
}

/// Discards tokens; for sessions that are never stored.
pub struct EphemeralTokens;

impl TokenStore for EphemeralTokens {
    fn persist(&self, _session: &UserSession) -> LauncherResult<()> {
        Ok(())
    }
}

/// The last session, kept as JSON in the data directory.
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub const FILE_NAME: &'static str = "session.json";

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(Self::FILE_NAME))
    }

    /// `None` when nothing was stored yet.
    pub fn load(&self) -> LauncherResult<Option<UserSession>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LauncherError::io(&self.path, source)),
        }
    }
}

impl TokenStore for SessionFile {
    fn persist(&self, session: &UserSession) -> LauncherResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LauncherError::io(parent, source))?;
        }
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, json).map_err(|source| LauncherError::io(&self.path, source))?;
        debug!("Session saved to {:?}", self.path);
        Ok(())
    }
}

/// 32 lowercase hex characters.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Fill in fresh access/client tokens when the session has none and report
/// them through `store`. Returns the session to launch with.
pub fn ensure_tokens(mut session: UserSession, store: &dyn TokenStore) -> LauncherResult<UserSession> {
    if session.has_access_token() {
        return Ok(session);
    }
    session.access_token = Some(generate_token());
    session.client_token = Some(generate_token());
    info!("Generated new tokens for {}", session.display_name());
    store.persist(&session)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<UserSession>>);

    impl TokenStore for Recording {
        fn persist(&self, session: &UserSession) -> LauncherResult<()> {
            self.0.lock().unwrap().push(session.clone());
            Ok(())
        }
    }

    #[test]
    fn tokens_are_32_hex() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn missing_token_is_regenerated_and_persisted() {
        let store = Recording::default();
        let session = ensure_tokens(UserSession::offline("  Steve "), &store).unwrap();

        assert_eq!(session.username, "Steve");
        assert!(session.has_access_token());
        assert_eq!(session.client_token.as_ref().map(String::len), Some(32));
        assert_eq!(store.0.lock().unwrap().as_slice(), &[session]);
    }

    #[test]
    fn existing_token_is_kept() {
        let store = Recording::default();
        let session = UserSession {
            username: "Alex".into(),
            access_token: Some("abc".into()),
            client_token: None,
        };
        let same = ensure_tokens(session.clone(), &store).unwrap();
        assert_eq!(same, session);
        assert!(store.0.lock().unwrap().is_empty());
    }

    #[test]
    fn session_file_round_trips_regenerated_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionFile::in_dir(&dir.path().join("data"));
        assert!(store.load().unwrap().is_none());

        let session = ensure_tokens(UserSession::offline("Steve"), &store).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));
    }

    #[test]
    fn blank_name_displays_as_player() {
        assert_eq!(UserSession::offline("   ").display_name(), "Player");
    }
}
