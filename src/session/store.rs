// Durable session storage
//
// In-memory state is the read path; every mutation rewrites the backing
// auth_kv table in one transaction so a page-reload-equivalent restart
// resumes the session.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{Mutex, RwLock};

use super::types::{CredentialPair, Session, UserIdentity};

const KEY_ACCESS: &str = "access_token";
const KEY_REFRESH: &str = "refresh_token";
const KEY_USER: &str = "user";

#[derive(Debug, Default, Clone)]
struct State {
    credentials: Option<CredentialPair>,
    identity: Option<UserIdentity>,
}

/// Holder of the current credential pair and cached user identity.
///
/// Readers never observe a half-written pair: the pair is only ever
/// replaced wholesale under the write lock. Absence of a value is a normal
/// state and means "unauthenticated".
pub struct TokenStore {
    state: RwLock<State>,
    db: Mutex<Connection>,
}

impl TokenStore {
    /// Open (or create) the backing database and load the stored session
    /// once into memory.
    pub fn open(path: &Path) -> Result<TokenStore> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open session storage: {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Volatile store; nothing survives the process. Used by tests and
    /// ephemeral sessions.
    pub fn in_memory() -> Result<TokenStore> {
        let conn =
            Connection::open_in_memory().context("failed to open in-memory session storage")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<TokenStore> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .context("failed to initialize session storage schema")?;
        let state = load_state(&conn)?;
        if state.credentials.is_some() {
            tracing::debug!("resumed stored session");
        }
        Ok(TokenStore {
            state: RwLock::new(state),
            db: Mutex::new(conn),
        })
    }

    /// Current credential pair, if signed in
    pub async fn get(&self) -> Option<CredentialPair> {
        self.state.read().await.credentials.clone()
    }

    /// Cached identity of the signed-in user
    pub async fn identity(&self) -> Option<UserIdentity> {
        self.state.read().await.identity.clone()
    }

    /// Full session when both identity and credentials are present
    pub async fn session(&self) -> Option<Session> {
        let state = self.state.read().await;
        match (&state.identity, &state.credentials) {
            (Some(identity), Some(credentials)) => Some(Session {
                identity: identity.clone(),
                credentials: credentials.clone(),
            }),
            _ => None,
        }
    }

    /// Replace the credential pair, and the identity when one is given
    pub async fn set(
        &self,
        credentials: CredentialPair,
        identity: Option<UserIdentity>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.credentials = Some(credentials);
        if identity.is_some() {
            state.identity = identity;
        }
        self.persist(&state).await
    }

    /// Replace only the access credential after a renewal; the refresh
    /// credential is kept. A store cleared mid-renewal stays cleared.
    pub async fn set_access(&self, access: &str) -> Result<()> {
        let mut state = self.state.write().await;
        match state.credentials.as_mut() {
            Some(pair) => pair.access = access.to_string(),
            None => {
                tracing::warn!("renewed access credential dropped, store was cleared mid-renewal");
                return Ok(());
            }
        }
        self.persist(&state).await
    }

    /// Replace the identity fields of a signed-in session
    pub async fn set_identity(&self, identity: UserIdentity) -> Result<()> {
        let mut state = self.state.write().await;
        if state.credentials.is_none() {
            tracing::debug!("identity update ignored, not signed in");
            return Ok(());
        }
        state.identity = Some(identity);
        self.persist(&state).await
    }

    /// Remove both credential and identity
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.credentials = None;
        state.identity = None;
        self.persist(&state).await
    }

    async fn persist(&self, state: &State) -> Result<()> {
        let mut conn = self.db.lock().await;
        let tx = conn
            .transaction()
            .context("failed to open storage transaction")?;
        match &state.credentials {
            Some(pair) => {
                upsert(&tx, KEY_ACCESS, &pair.access)?;
                upsert(&tx, KEY_REFRESH, &pair.refresh)?;
            }
            None => {
                tx.execute(
                    "DELETE FROM auth_kv WHERE key IN (?1, ?2)",
                    params![KEY_ACCESS, KEY_REFRESH],
                )
                .context("failed to clear stored credentials")?;
            }
        }
        match &state.identity {
            Some(identity) => {
                let blob =
                    serde_json::to_string(identity).context("failed to encode identity")?;
                upsert(&tx, KEY_USER, &blob)?;
            }
            None => {
                tx.execute("DELETE FROM auth_kv WHERE key = ?1", params![KEY_USER])
                    .context("failed to clear stored identity")?;
            }
        }
        tx.commit().context("failed to commit storage transaction")
    }
}

fn upsert(tx: &rusqlite::Transaction<'_>, key: &str, value: &str) -> Result<()> {
    tx.execute(
        "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .with_context(|| format!("failed to write {key} to session storage"))?;
    Ok(())
}

fn load_state(conn: &Connection) -> Result<State> {
    let read = |key: &str| -> Result<Option<String>> {
        conn.query_row("SELECT value FROM auth_kv WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("failed to read {key} from session storage"))
    };

    // A lone credential is useless: without a refresh nothing can renew the
    // access, and without an access the refresh has nothing to extend.
    let credentials = match (read(KEY_ACCESS)?, read(KEY_REFRESH)?) {
        (Some(access), Some(refresh)) => Some(CredentialPair { access, refresh }),
        _ => None,
    };

    // A corrupt identity blob is treated as absent; the credentials still
    // stand on their own and a profile fetch re-establishes the identity.
    let identity = read(KEY_USER)?.and_then(|blob| serde_json::from_str(&blob).ok());

    Ok(State {
        credentials,
        identity,
    })
}
