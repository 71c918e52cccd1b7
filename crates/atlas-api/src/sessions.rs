//! Scanner session lifecycle: issue, authenticate, expire, end.
//!
//! State machine per session: `Active -> Ended` (explicit) or
//! `Active -> Expired` (absolute 2-hour TTL). Terminal states never
//! transition again, and both answer `SessionInvalid` identically.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use atlas_db::{Database, queries};
use atlas_types::error::CatalogError;
use atlas_types::models::SessionState;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

pub const SESSION_TTL_HOURS: i64 = 2;

#[derive(Clone)]
pub struct SessionManager {
    db: Arc<Database>,
}

impl SessionManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Issue a session id and a one-time password. Only the Argon2 hash of
    /// the password is stored; the plaintext goes back to the caller once
    /// and is never recoverable.
    pub async fn create(&self, scanner_version: String) -> Result<(Uuid, String), CatalogError> {
        let session_id = Uuid::new_v4();

        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes[..]);
        let password = URL_SAFE_NO_PAD.encode(bytes);

        let to_hash = password.clone();
        let hash = task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(to_hash.as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| CatalogError::Fatal(format!("password hashing failed: {e}")))
        })
        .await
        .map_err(join_err)??;

        let db = Arc::clone(&self.db);
        let version = scanner_version.clone();
        task::spawn_blocking(move || {
            queries::insert_session(&db, session_id, &hash, &version, Utc::now())
        })
        .await
        .map_err(join_err)??;

        info!("Scanner session {} created (version {})", session_id, scanner_version);
        Ok((session_id, password))
    }

    /// Precondition for every authenticated scanner call.
    ///
    /// An unknown session id and a wrong password are indistinguishable
    /// (`Unauthorized`); a correct credential against a terminal or
    /// overdue session is `SessionInvalid`.
    pub async fn authenticate(
        &self,
        session_id: &str,
        password: &str,
    ) -> Result<Uuid, CatalogError> {
        let raw_id = session_id.to_string();
        let db = Arc::clone(&self.db);
        let row = task::spawn_blocking(move || queries::get_session(&db, &raw_id))
            .await
            .map_err(join_err)??
            .ok_or(CatalogError::Unauthorized)?;

        let stored_hash = row.password_hash.clone();
        let presented = password.to_string();
        let verified = task::spawn_blocking(move || {
            PasswordHash::new(&stored_hash)
                .map(|parsed| {
                    Argon2::default()
                        .verify_password(presented.as_bytes(), &parsed)
                        .is_ok()
                })
                .unwrap_or(false)
        })
        .await
        .map_err(join_err)?;
        if !verified {
            return Err(CatalogError::Unauthorized);
        }

        let session = row.into_session();
        if session.state != SessionState::Active {
            return Err(CatalogError::SessionInvalid);
        }

        // Absolute TTL from creation, regardless of activity since.
        if Utc::now() - session.created_at >= ChronoDuration::hours(SESSION_TTL_HOURS) {
            let db = Arc::clone(&self.db);
            let id = session.id;
            let _ =
                task::spawn_blocking(move || queries::set_session_state(&db, id, "expired")).await;
            return Err(CatalogError::SessionInvalid);
        }

        let db = Arc::clone(&self.db);
        let id = session.id;
        task::spawn_blocking(move || queries::touch_session(&db, id, Utc::now()))
            .await
            .map_err(join_err)??;

        Ok(session.id)
    }

    pub async fn end(&self, session_id: Uuid) -> Result<(), CatalogError> {
        let db = Arc::clone(&self.db);
        let ended =
            task::spawn_blocking(move || queries::set_session_state(&db, session_id, "ended"))
                .await
                .map_err(join_err)??;
        if !ended {
            return Err(CatalogError::SessionInvalid);
        }
        info!("Scanner session {} ended", session_id);
        Ok(())
    }

    /// Append one encounter event and bump the session counter. Reads and
    /// logs only — never touches room records.
    pub async fn record_encounter(
        &self,
        session_id: Uuid,
        room_name: &str,
    ) -> Result<(), CatalogError> {
        let db = Arc::clone(&self.db);
        let room_name = room_name.to_string();
        task::spawn_blocking(move || {
            queries::record_encounter(&db, session_id, &room_name, Utc::now())
        })
        .await
        .map_err(join_err)?
    }

    /// Expire every active session past the absolute TTL.
    pub async fn sweep(&self) -> Result<usize, CatalogError> {
        let db = Arc::clone(&self.db);
        let cutoff = Utc::now() - ChronoDuration::hours(SESSION_TTL_HOURS);
        task::spawn_blocking(move || queries::expire_sessions_before(&db, cutoff))
            .await
            .map_err(join_err)?
    }
}

fn join_err(e: tokio::task::JoinError) -> CatalogError {
    CatalogError::Fatal(format!("blocking task failed: {e}"))
}

/// Background task that expires overdue sessions on an interval.
pub async fn run_sweep_loop(manager: SessionManager, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match manager.sweep().await {
            Ok(count) => {
                if count > 0 {
                    info!("Session sweep: expired {} session(s)", count);
                }
            }
            Err(e) => {
                warn!("Session sweep error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_manager() -> (tempfile::TempDir, SessionManager, Arc<Database>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("atlas.db")).unwrap());
        (dir, SessionManager::new(Arc::clone(&db)), db)
    }

    fn hash_of(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    /// Insert a session whose creation time we control.
    fn seed_session(db: &Database, password: &str, age: ChronoDuration) -> Uuid {
        let id = Uuid::new_v4();
        queries::insert_session(db, id, &hash_of(password), "1.0.0", Utc::now() - age).unwrap();
        id
    }

    #[tokio::test]
    async fn issued_credentials_authenticate() {
        let (_dir, manager, _db) = open_manager();
        let (id, password) = manager.create("1.4.2".into()).await.unwrap();

        let authed = manager.authenticate(&id.to_string(), &password).await.unwrap();
        assert_eq!(authed, id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_session_are_indistinguishable() {
        let (_dir, manager, _db) = open_manager();
        let (id, _password) = manager.create("1.4.2".into()).await.unwrap();

        let wrong = manager
            .authenticate(&id.to_string(), "not-the-password")
            .await
            .unwrap_err();
        let unknown = manager
            .authenticate(&Uuid::new_v4().to_string(), "whatever")
            .await
            .unwrap_err();

        assert!(matches!(wrong, CatalogError::Unauthorized));
        assert!(matches!(unknown, CatalogError::Unauthorized));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn ended_session_rejects_further_use() {
        let (_dir, manager, _db) = open_manager();
        let (id, password) = manager.create("1.4.2".into()).await.unwrap();

        manager.end(id).await.unwrap();
        let err = manager.authenticate(&id.to_string(), &password).await.unwrap_err();
        assert!(matches!(err, CatalogError::SessionInvalid));

        // Terminal is terminal: ending again fails the same way.
        assert!(matches!(manager.end(id).await.unwrap_err(), CatalogError::SessionInvalid));
    }

    #[tokio::test]
    async fn session_expires_absolutely_at_two_hours() {
        let (_dir, manager, db) = open_manager();

        // 1h59m59s old: still fine, activity or not.
        let fresh = seed_session(
            &db,
            "pw-fresh",
            ChronoDuration::hours(2) - ChronoDuration::seconds(1),
        );
        manager.authenticate(&fresh.to_string(), "pw-fresh").await.unwrap();

        // 2h0m1s old: expired even though it just saw activity.
        let overdue = seed_session(
            &db,
            "pw-old",
            ChronoDuration::hours(2) + ChronoDuration::seconds(1),
        );
        queries::touch_session(&db, overdue, Utc::now()).unwrap();
        let err = manager
            .authenticate(&overdue.to_string(), "pw-old")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::SessionInvalid));
    }

    #[tokio::test]
    async fn sweep_expires_only_overdue_sessions() {
        let (_dir, manager, db) = open_manager();
        let overdue = seed_session(&db, "pw-a", ChronoDuration::hours(3));
        let fresh = seed_session(&db, "pw-b", ChronoDuration::minutes(5));

        assert_eq!(manager.sweep().await.unwrap(), 1);

        let overdue_row = queries::get_session(&db, &overdue.to_string()).unwrap().unwrap();
        assert_eq!(overdue_row.state, "expired");
        let fresh_row = queries::get_session(&db, &fresh.to_string()).unwrap().unwrap();
        assert_eq!(fresh_row.state, "active");

        // Sweeping again finds nothing new.
        assert_eq!(manager.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn encounters_append_and_count() {
        let (_dir, manager, db) = open_manager();
        let (id, _password) = manager.create("1.4.2".into()).await.unwrap();

        manager.record_encounter(id, "Compact Belt Balancer").await.unwrap();
        manager.record_encounter(id, "Uncharted Vault").await.unwrap();

        let row = queries::get_session(&db, &id.to_string()).unwrap().unwrap();
        assert_eq!(row.encounter_count, 2);

        let events = queries::session_encounters(&db, id).unwrap();
        assert_eq!(events.len(), 2);
        // Names are logged verbatim, documented or not.
        assert_eq!(events[1].room_name, "Uncharted Vault");
    }
}
