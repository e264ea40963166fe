//! RelStore: durable storage of users, posts, follow-edges.
//!
//! All writes that must update more than one row atomically (bulk create,
//! follow edges + counters) are wrapped in a manually-issued transaction
//! acquired from the pool, mirroring the rest of this codebase's manual
//! `BEGIN IMMEDIATE`/`COMMIT`/`ROLLBACK` pattern rather than sqlx's
//! `Transaction` wrapper, so the same connection can be reused across the
//! counter update and the edge write.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};

use super::models::{FollowEdge, Nanos, Post, User};
use crate::error::{AppError, Result};

/// Durable relational store. Cheaply cloneable (wraps a pooled connection).
#[derive(Clone)]
pub struct RelStore {
    pool: Pool<Sqlite>,
}

impl RelStore {
    /// `max_connections` bounds the pool at spec.md §5's "process-wide, max
    /// 25 DB connections" (the caller passes `config.database.max_connections`).
    pub async fn connect(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("failed to create database directory: {e}"))
                })?;
            }
        }

        // `foreign_keys(true)` is per-connection state in SQLite, off by
        // default; without it the `ON DELETE CASCADE` in migrations is a
        // no-op. sqlx applies it to every pooled connection, not just the
        // first.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    // ---- User ops -----------------------------------------------------

    pub async fn create_user(&self, username: &str) -> Result<User> {
        let now = Nanos::now();
        let result = sqlx::query(
            "INSERT INTO users (username, follower_count, following_count, created_at) VALUES (?, 0, 0, ?)",
        )
        .bind(username)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(res) => Ok(User {
                id: res.last_insert_rowid(),
                username: username.to_string(),
                follower_count: 0,
                following_count: 0,
                created_at: now,
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::Conflict(format!("username taken: {username}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_user_by_id(&self, uid: i64) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn get_all_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_celebrities(&self, threshold: i64) -> Result<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE follower_count >= ? ORDER BY follower_count DESC",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_random_users(&self, n: i64) -> Result<Vec<User>> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY RANDOM() LIMIT ?")
                .bind(n)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn count_users(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn count_celebrities(&self, threshold: i64) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE follower_count >= ?",
        )
        .bind(threshold)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Idempotent on username conflict: existing usernames are skipped, not
    /// treated as an error, so callers can re-run a seed list safely.
    pub async fn bulk_create_users(&self, usernames: &[String]) -> Result<Vec<User>> {
        if usernames.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<Vec<User>> = async {
            let mut created = Vec::with_capacity(usernames.len());
            for username in usernames {
                let now = Nanos::now();
                let inserted = sqlx::query(
                    "INSERT INTO users (username, follower_count, following_count, created_at) VALUES (?, 0, 0, ?) ON CONFLICT(username) DO NOTHING",
                )
                .bind(username)
                .bind(now)
                .execute(&mut *conn)
                .await?;

                if inserted.rows_affected() > 0 {
                    created.push(User {
                        id: inserted.last_insert_rowid(),
                        username: username.clone(),
                        follower_count: 0,
                        following_count: 0,
                        created_at: now,
                    });
                }
            }
            Ok(created)
        }
        .await;

        match result {
            Ok(created) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(created)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    pub async fn delete_user(&self, uid: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn truncate_users(&self) -> Result<()> {
        sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(())
    }

    /// Recompute `follower_count`/`following_count` from the `follows` table.
    /// Restores the denormalized counters if they have ever drifted.
    pub async fn rebuild_counters(&self) -> Result<()> {
        sqlx::query(
            "UPDATE users SET follower_count = (SELECT COUNT(*) FROM follows WHERE followee_id = users.id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "UPDATE users SET following_count = (SELECT COUNT(*) FROM follows WHERE follower_id = users.id)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Post ops -------------------------------------------------------

    pub async fn create_post(&self, uid: i64, content: &str) -> Result<Post> {
        let now = Nanos::now();
        let res = sqlx::query("INSERT INTO posts (user_id, content, created_at) VALUES (?, ?, ?)")
            .bind(uid)
            .bind(content)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(Post {
            id: res.last_insert_rowid(),
            user_id: uid,
            content: content.to_string(),
            created_at: now,
            username: String::new(),
        })
    }

    pub async fn get_post_by_id(&self, pid: i64) -> Result<Option<Post>> {
        Ok(sqlx::query_as::<_, Post>(
            "SELECT id, user_id, content, created_at FROM posts WHERE id = ?",
        )
        .bind(pid)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Returns posts for the given ids in descending `created_at` order.
    pub async fn get_posts_by_ids(&self, pids: &[i64]) -> Result<Vec<Post>> {
        if pids.is_empty() {
            return Ok(vec![]);
        }

        let mut all = Vec::with_capacity(pids.len());
        for chunk in pids.chunks(100) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "SELECT id, user_id, content, created_at FROM posts WHERE id IN (",
            );
            let mut separated = qb.separated(", ");
            for pid in chunk {
                separated.push_bind(pid);
            }
            qb.push(") ORDER BY created_at DESC, id DESC");
            let posts = qb.build_query_as::<Post>().fetch_all(&self.pool).await?;
            all.extend(posts);
        }
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    pub async fn get_posts_by_user_id(&self, uid: i64, limit: i64) -> Result<Vec<Post>> {
        Ok(sqlx::query_as::<_, Post>(
            "SELECT id, user_id, content, created_at FROM posts WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(uid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_posts_by_user_ids(&self, uids: &[i64], limit: i64) -> Result<Vec<Post>> {
        if uids.is_empty() {
            return Ok(vec![]);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, user_id, content, created_at FROM posts WHERE user_id IN (",
        );
        {
            let mut separated = qb.separated(", ");
            for uid in uids {
                separated.push_bind(uid);
            }
        }
        qb.push(") ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit);

        Ok(qb.build_query_as::<Post>().fetch_all(&self.pool).await?)
    }

    /// Top `per_user_limit` most-recent posts per author within `uids`,
    /// globally ordered and truncated to `total_limit`. Expressed as a
    /// single windowed query rather than one fetch per author.
    pub async fn get_recent_by_user_ids(
        &self,
        uids: &[i64],
        per_user_limit: i64,
        total_limit: i64,
    ) -> Result<Vec<Post>> {
        if uids.is_empty() {
            return Ok(vec![]);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, user_id, content, created_at FROM (
                SELECT id, user_id, content, created_at,
                       ROW_NUMBER() OVER (
                           PARTITION BY user_id ORDER BY created_at DESC, id DESC
                       ) AS rn
                FROM posts WHERE user_id IN (",
        );
        {
            let mut separated = qb.separated(", ");
            for uid in uids {
                separated.push_bind(uid);
            }
        }
        qb.push(")) WHERE rn <= ");
        qb.push_bind(per_user_limit);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(total_limit);

        Ok(qb.build_query_as::<Post>().fetch_all(&self.pool).await?)
    }

    pub async fn bulk_create_posts(&self, posts: &[(i64, String)]) -> Result<Vec<Post>> {
        if posts.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<Vec<Post>> = async {
            let mut created = Vec::with_capacity(posts.len());
            for (uid, content) in posts {
                let now = Nanos::now();
                let res = sqlx::query(
                    "INSERT INTO posts (user_id, content, created_at) VALUES (?, ?, ?)",
                )
                .bind(uid)
                .bind(content)
                .bind(now)
                .execute(&mut *conn)
                .await?;

                created.push(Post {
                    id: res.last_insert_rowid(),
                    user_id: *uid,
                    content: content.clone(),
                    created_at: now,
                    username: String::new(),
                });
            }
            Ok(created)
        }
        .await;

        match result {
            Ok(created) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(created)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    pub async fn delete_post(&self, pid: i64) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(pid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn truncate_posts(&self) -> Result<()> {
        sqlx::query("DELETE FROM posts").execute(&self.pool).await?;
        Ok(())
    }

    // ---- Follow ops -----------------------------------------------------

    /// Idempotent on duplicate edge; counters move atomically with the edge.
    pub async fn create_follow(&self, follower_id: i64, followee_id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<()> = async {
            let now = Nanos::now();
            let inserted = sqlx::query(
                "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?) ON CONFLICT(follower_id, followee_id) DO NOTHING",
            )
            .bind(follower_id)
            .bind(followee_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            if inserted.rows_affected() > 0 {
                sqlx::query("UPDATE users SET following_count = following_count + 1 WHERE id = ?")
                    .bind(follower_id)
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("UPDATE users SET follower_count = follower_count + 1 WHERE id = ?")
                    .bind(followee_id)
                    .execute(&mut *conn)
                    .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    pub async fn delete_follow(&self, follower_id: i64, followee_id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<()> = async {
            let deleted = sqlx::query(
                "DELETE FROM follows WHERE follower_id = ? AND followee_id = ?",
            )
            .bind(follower_id)
            .bind(followee_id)
            .execute(&mut *conn)
            .await?;

            if deleted.rows_affected() > 0 {
                sqlx::query(
                    "UPDATE users SET following_count = MAX(following_count - 1, 0) WHERE id = ?",
                )
                .bind(follower_id)
                .execute(&mut *conn)
                .await?;
                sqlx::query(
                    "UPDATE users SET follower_count = MAX(follower_count - 1, 0) WHERE id = ?",
                )
                .bind(followee_id)
                .execute(&mut *conn)
                .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    pub async fn get_followers(&self, uid: i64) -> Result<Vec<i64>> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT follower_id FROM follows WHERE followee_id = ?",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_following(&self, uid: i64) -> Result<Vec<i64>> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT followee_id FROM follows WHERE follower_id = ?",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_following_users(&self, uid: i64) -> Result<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT u.* FROM users u JOIN follows f ON f.followee_id = u.id WHERE f.follower_id = ?",
        )
        .bind(uid)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_following_celebrities(&self, uid: i64, threshold: i64) -> Result<Vec<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT u.* FROM users u JOIN follows f ON f.followee_id = u.id
             WHERE f.follower_id = ? AND u.follower_count >= ?
             ORDER BY u.follower_count DESC",
        )
        .bind(uid)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_following_non_celebrities(&self, uid: i64, threshold: i64) -> Result<Vec<i64>> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT u.id FROM users u JOIN follows f ON f.followee_id = u.id
             WHERE f.follower_id = ? AND u.follower_count < ?",
        )
        .bind(uid)
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn is_following(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM follows WHERE follower_id = ? AND followee_id = ?",
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn count_follows(&self) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows")
            .fetch_one(&self.pool)
            .await?)
    }

    /// Idempotent on conflict; counters are recomputed once at the end via
    /// `rebuild_counters` rather than incremented per edge, since bulk
    /// seeding routinely inserts thousands of edges at once.
    pub async fn bulk_create_follows(&self, edges: &[(i64, i64)]) -> Result<Vec<FollowEdge>> {
        if edges.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<Vec<FollowEdge>> = async {
            let mut created = Vec::with_capacity(edges.len());
            for (follower_id, followee_id) in edges {
                let now = Nanos::now();
                let inserted = sqlx::query(
                    "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?) ON CONFLICT(follower_id, followee_id) DO NOTHING",
                )
                .bind(follower_id)
                .bind(followee_id)
                .bind(now)
                .execute(&mut *conn)
                .await?;

                if inserted.rows_affected() > 0 {
                    created.push(FollowEdge {
                        follower_id: *follower_id,
                        followee_id: *followee_id,
                        created_at: now,
                    });
                }
            }
            Ok(created)
        }
        .await;

        match result {
            Ok(created) => {
                sqlx::query(
                    "UPDATE users SET follower_count = (SELECT COUNT(*) FROM follows WHERE followee_id = users.id)",
                )
                .execute(&mut *conn)
                .await?;
                sqlx::query(
                    "UPDATE users SET following_count = (SELECT COUNT(*) FROM follows WHERE follower_id = users.id)",
                )
                .execute(&mut *conn)
                .await?;
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(created)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "relstore_test.rs"]
mod relstore_test;
