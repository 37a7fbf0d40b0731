use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::model::Ms;
use crate::store::{Store, StoreError, now_ms};

const REAP_INTERVAL: Duration = Duration::from_secs(60);
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// One reaper pass: drop expired sessions and reset tokens, and mark lessons
/// that have ended as completed. Returns `(expired, completed)`.
pub async fn reap_once(store: &Store, now: Ms) -> Result<(usize, usize), StoreError> {
    let expired = store.collect_expired(now).await?;
    let completed = store.complete_finished_bookings(now).await?;
    Ok((expired, completed))
}

/// Background task that periodically cleans up expired credentials and
/// finished lessons.
pub async fn run_reaper(store: Arc<Store>) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        match reap_once(&store, now_ms()).await {
            Ok((0, 0)) => {}
            Ok((expired, completed)) => {
                info!("reaper: {expired} expired credentials removed, {completed} lessons completed")
            }
            Err(e) => warn!("reaper pass failed: {e}"),
        }
    }
}

/// Background task that rewrites the WAL once enough appends piled up.
pub async fn run_compactor(store: Arc<Store>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = store.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("flexibook_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn reaper_collects_expired_credentials() {
        let store = Store::open(test_wal_path("reaper_collect.wal")).unwrap();
        let user = User {
            id: Ulid::new(),
            email: "a@example.com".into(),
            name: None,
            image: None,
            password_hash: None,
            role: Some(Role::Student),
            timezone: "UTC".into(),
            created_at: 0,
        };
        let user_id = user.id;
        store.create_user(user).await.unwrap();

        let now = now_ms();
        store
            .issue_session(Session {
                digest: "old".into(),
                user_id,
                expires_at: now - 1000,
            })
            .await
            .unwrap();
        store
            .issue_session(Session {
                digest: "live".into(),
                user_id,
                expires_at: now + HOUR_MS,
            })
            .await
            .unwrap();
        store
            .issue_reset_token(ResetToken {
                digest: "reset".into(),
                email: "a@example.com".into(),
                expires_at: now - 1,
            })
            .await
            .unwrap();

        assert_eq!(reap_once(&store, now).await.unwrap(), (2, 0));
        assert_eq!(reap_once(&store, now).await.unwrap(), (0, 0));
        assert!(store.session_user("live", now).is_some());
    }
}
