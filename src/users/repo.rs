#[cfg(test)]
use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
#[cfg(test)]
use tokio::sync::Mutex;

use crate::users::repo_types::{User, UserRow};

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    AlreadyExists,
}

/// Users keyed by email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Inserts `user` unless its email is taken. Atomic with respect to
    /// concurrent inserts of the same email.
    async fn insert(&self, user: &User) -> anyhow::Result<InsertOutcome>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, profile_picture, bio, tests_created,
                   tests_completed, average_score, joined_at, role, password_hash
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("select user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn insert(&self, user: &User) -> anyhow::Result<InsertOutcome> {
        // The unique index on email arbitrates concurrent signups.
        let inserted = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            INSERT INTO users (id, name, email, profile_picture, bio, tests_created,
                               tests_completed, average_score, joined_at, role, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (email) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.profile_picture)
        .bind(&user.bio)
        .bind(user.tests_created)
        .bind(user.tests_completed)
        .bind(user.average_score)
        .bind(user.joined_at)
        .bind(user.role.as_str())
        .bind(user.password_hash.as_deref())
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;

        Ok(match inserted {
            Some(_) => InsertOutcome::Created,
            None => InsertOutcome::AlreadyExists,
        })
    }
}

/// Process-local store with the same semantics as [`PgUserStore`].
#[cfg(test)]
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

#[cfg(test)]
impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }
}

#[cfg(test)]
#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().await.get(email).cloned())
    }

    async fn insert(&self, user: &User) -> anyhow::Result<InsertOutcome> {
        use std::collections::hash_map::Entry;

        let mut users = self.users.lock().await;
        Ok(match users.entry(user.email.clone()) {
            Entry::Occupied(_) => InsertOutcome::AlreadyExists,
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                InsertOutcome::Created
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;

    fn user(email: &str) -> User {
        User::local("Test".into(), email.into(), Role::Teacher, "hash".into())
    }

    #[tokio::test]
    async fn memory_store_inserts_once_per_email() {
        let store = MemoryUserStore::new();
        assert_eq!(
            store.insert(&user("a@example.com")).await.unwrap(),
            InsertOutcome::Created
        );
        assert_eq!(
            store.insert(&user("a@example.com")).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn memory_store_lookup_is_exact_match() {
        let store = MemoryUserStore::new();
        store.insert(&user("a@example.com")).await.unwrap();
        assert!(store.find_by_email("a@example.com").await.unwrap().is_some());
        assert!(store.find_by_email("A@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_inserts_create_a_single_user() {
        let store = std::sync::Arc::new(MemoryUserStore::new());
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert(&user("race@example.com")).await.unwrap() })
            })
            .collect();

        let mut created = 0;
        for t in tasks {
            if t.await.unwrap() == InsertOutcome::Created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len().await, 1);
    }
}
