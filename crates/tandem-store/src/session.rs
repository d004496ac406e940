//! Session management on top of [`Storage`].

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage::{Storage, StorageExt};

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "tandem_session";

/// Maximum retry attempts for optimistic concurrency control.
const MAX_UPDATE_RETRIES: u32 = 3;

/// A unique session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new session ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new cryptographically secure session ID.
    pub fn generate() -> Self {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use rand::Rng;

        let bytes: [u8; 18] = rand::thread_rng().gen();
        Self(format!("sess_{}", URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Find the session id in a `Cookie` header value.
    pub fn from_cookie_header(header: &str) -> Option<Self> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
            .map(Self::new)
    }

    /// `Set-Cookie` value carrying this id.
    pub fn to_cookie(&self) -> String {
        format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, self.0)
    }

    /// Get the session ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session data as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData<T> {
    pub id: SessionId,
    pub data: T,
    /// Incremented on every write.
    pub version: u64,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub last_accessed: u64,
}

/// Opaque per-session data of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize, Default, Clone)]
/// struct UserSession {
///     user_id: Option<String>,
///     cart_id: Option<String>,
/// }
///
/// let sessions = SessionStore::<UserSession>::new(storage);
/// let id = SessionId::from("abc123");
///
/// let mut data = sessions.get_or_create(&id).await?;
/// data.user_id = Some("user456".to_string());
/// sessions.set(&id, &data).await?;
/// ```
pub struct SessionStore<T> {
    storage: Arc<dyn Storage>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for SessionStore<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            _phantom: PhantomData,
        }
    }
}

impl<T> SessionStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync,
{
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            _phantom: PhantomData,
        }
    }

    /// Get session data, or create a new session if it doesn't exist.
    pub async fn get_or_create(&self, id: &SessionId) -> Result<T, StoreError> {
        match self.get_versioned(id).await? {
            Some(session) => Ok(session.data),
            None => {
                let data = T::default();
                self.write(id, &data, 1, None).await?;
                Ok(data)
            }
        }
    }

    /// Get session data if it exists.
    pub async fn get(&self, id: &SessionId) -> Result<Option<T>, StoreError> {
        Ok(self.get_versioned(id).await?.map(|s| s.data))
    }

    /// Get full session data including version.
    pub async fn get_versioned(&self, id: &SessionId) -> Result<Option<SessionData<T>>, StoreError> {
        self.storage.get_as::<SessionData<T>>(&session_key(id)).await
    }

    /// Unconditional write.
    pub async fn set(&self, id: &SessionId, data: &T) -> Result<u64, StoreError> {
        let current = self.get_versioned(id).await?;
        let version = current.as_ref().map_or(1, |s| s.version + 1);
        self.write(id, data, version, current.map(|s| s.created_at)).await?;
        Ok(version)
    }

    /// Write only if the stored version is still `expected` (0 for a
    /// session that does not exist yet). Returns the new version.
    pub async fn set_versioned(&self, id: &SessionId, data: &T, expected: u64) -> Result<u64, StoreError> {
        let current = self.get_versioned(id).await?;
        let found = current.as_ref().map_or(0, |s| s.version);
        if found != expected {
            return Err(StoreError::ConcurrentModification(format!(
                "session {} is at version {}, expected {}",
                id, found, expected
            )));
        }
        self.write(id, data, expected + 1, current.map(|s| s.created_at)).await?;
        Ok(expected + 1)
    }

    /// Delete a session.
    pub async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.storage.delete(&session_key(id)).await
    }

    /// Check if a session exists.
    pub async fn exists(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.storage.exists(&session_key(id)).await
    }

    /// Read-modify-write with optimistic concurrency control.
    ///
    /// Retries up to `MAX_UPDATE_RETRIES` times when another writer got in
    /// between the read and the write.
    pub async fn update<F>(&self, id: &SessionId, f: F) -> Result<T, StoreError>
    where
        F: Fn(&mut T) + Send + Sync,
    {
        for _attempt in 0..MAX_UPDATE_RETRIES {
            let (mut data, expected) = match self.get_versioned(id).await? {
                Some(session) => (session.data, session.version),
                None => (T::default(), 0),
            };
            f(&mut data);

            match self.set_versioned(id, &data, expected).await {
                Ok(_) => return Ok(data),
                Err(StoreError::ConcurrentModification(_)) => continue,
                Err(err) => return Err(err),
            }
        }

        Err(StoreError::ConcurrentModification(
            "max retries exceeded".to_string(),
        ))
    }

    async fn write(&self, id: &SessionId, data: &T, version: u64, created_at: Option<u64>) -> Result<(), StoreError> {
        let now = unix_now();
        let session = SessionData {
            id: id.clone(),
            data: data.clone(),
            version,
            created_at: created_at.unwrap_or(now),
            last_accessed: now,
        };
        self.storage.set_as(&session_key(id), &session).await
    }
}

fn session_key(id: &SessionId) -> String {
    format!("session:{}", id)
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Cart {
        items: Vec<String>,
    }

    fn sessions() -> SessionStore<Cart> {
        SessionStore::new(Arc::new(MemoryStore::new()))
    }

    // === SessionId Tests ===

    #[test]
    fn test_session_id_generate_format() {
        let id = SessionId::generate();
        let s = id.as_str();

        assert!(s.starts_with("sess_"));
        // 18 bytes base64 = 24 chars
        assert_eq!(s.len(), 29);
        assert_ne!(SessionId::generate(), id);
    }

    #[test]
    fn test_session_id_serialization() {
        let id = SessionId::new("serialize-me");
        let json = serde_json::to_string(&id).unwrap();

        assert_eq!(json, r#""serialize-me""#);
        assert_eq!(serde_json::from_str::<SessionId>(&json).unwrap(), id);
    }

    #[test]
    fn test_session_id_from_cookie() {
        let id = SessionId::from_cookie_header("theme=dark; tandem_session=sess_abc; other=1");
        assert_eq!(id, Some(SessionId::new("sess_abc")));

        assert_eq!(SessionId::from_cookie_header("theme=dark"), None);
        assert_eq!(SessionId::from_cookie_header("tandem_session="), None);
    }

    #[test]
    fn test_session_cookie_round_trip() {
        let id = SessionId::new("sess_xyz");
        let cookie = id.to_cookie();
        assert!(cookie.starts_with("tandem_session=sess_xyz;"));
        assert!(cookie.contains("HttpOnly"));
    }

    // === Store Tests ===

    #[tokio::test]
    async fn test_get_or_create() {
        let sessions = sessions();
        let id = SessionId::new("s1");

        assert_eq!(sessions.get(&id).await.unwrap(), None);
        assert_eq!(sessions.get_or_create(&id).await.unwrap(), Cart::default());
        assert!(sessions.exists(&id).await.unwrap());
        assert_eq!(sessions.get_versioned(&id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_set_increments_version() {
        let sessions = sessions();
        let id = SessionId::new("s1");
        let cart = Cart {
            items: vec!["sku-1".into()],
        };

        assert_eq!(sessions.set(&id, &cart).await.unwrap(), 1);
        assert_eq!(sessions.set(&id, &cart).await.unwrap(), 2);
        assert_eq!(sessions.get(&id).await.unwrap(), Some(cart));
    }

    #[tokio::test]
    async fn test_versioned_write_conflict() {
        let sessions = sessions();
        let id = SessionId::new("s1");
        sessions.set(&id, &Cart::default()).await.unwrap();

        assert!(matches!(
            sessions.set_versioned(&id, &Cart::default(), 0).await,
            Err(StoreError::ConcurrentModification(_))
        ));
        assert_eq!(sessions.set_versioned(&id, &Cart::default(), 1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let sessions = sessions();
        let id = SessionId::new("s1");

        let cart = sessions
            .update(&id, |cart| cart.items.push("sku-2".into()))
            .await
            .unwrap();
        assert_eq!(cart.items, vec!["sku-2"]);

        assert!(sessions.delete(&id).await.unwrap());
        assert!(!sessions.exists(&id).await.unwrap());
    }
}
