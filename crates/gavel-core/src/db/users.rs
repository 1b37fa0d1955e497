// Application users: the email → role mapping behind access control.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::rows::{self, USER_COLUMNS};
use super::{Database, DbError, DbResult};
use crate::changes::{ChangeKind, Table};
use crate::model::{AppUser, NewAppUser, Role};

impl Database {
    /// Every known user, newest first.
    pub fn list_users(&self) -> DbResult<Vec<AppUser>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM app_users ORDER BY created_at DESC, email"
        ))?;
        let users = stmt
            .query_map([], rows::user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Look a user up by email, ignoring case.
    pub fn get_user_by_email(&self, email: &str) -> DbResult<Option<AppUser>> {
        let conn = self.conn();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM app_users WHERE email = ?1"),
                [email.trim()],
                rows::user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user(&self, user_id: &str) -> DbResult<AppUser> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM app_users WHERE user_id = ?1"),
            [user_id],
            rows::user,
        )
        .optional()?
        .ok_or_else(|| DbError::not_found(Table::AppUsers, user_id))
    }

    /// Insert a user or refresh the identity fields of an existing one.
    /// A known email signing in under a new id keeps its row, which is
    /// rebound to that id. An existing user's role is never changed here.
    pub fn upsert_user(&self, user: &NewAppUser) -> DbResult<AppUser> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let rebound = tx.execute(
            "UPDATE app_users SET user_id = ?1 WHERE email = ?2 AND user_id <> ?1",
            params![user.user_id, user.email.trim()],
        )?;
        if rebound > 0 {
            info!(user_id = %user.user_id, "known email signed in under a new id");
        }
        let stored = tx.query_row(
            &format!(
                "INSERT INTO app_users (user_id, email, role, provider, created_at,
                                        email_confirmed, role_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    email           = excluded.email,
                    provider        = excluded.provider,
                    email_confirmed = excluded.email_confirmed
                 RETURNING {USER_COLUMNS}"
            ),
            params![
                user.user_id,
                user.email.trim(),
                user.role,
                user.provider,
                now,
                user.email_confirmed,
            ],
            rows::user,
        )?;
        tx.commit()?;
        drop(conn);

        self.publish(&[(Table::AppUsers, ChangeKind::Update)]);
        Ok(stored)
    }

    pub fn update_user_role(&self, user_id: &str, role: Role) -> DbResult<AppUser> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE app_users SET role = ?2, role_updated_at = ?3 WHERE user_id = ?1",
            params![user_id, role, Utc::now()],
        )?;
        if changed == 0 {
            return Err(DbError::not_found(Table::AppUsers, user_id));
        }
        drop(conn);

        info!(user_id, %role, "user role changed");
        self.publish(&[(Table::AppUsers, ChangeKind::Update)]);
        self.get_user(user_id)
    }

    pub fn record_sign_in(&self, user_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        let changed = self.conn().execute(
            "UPDATE app_users SET last_sign_in_at = ?2 WHERE user_id = ?1",
            params![user_id, at],
        )?;
        if changed == 0 {
            return Err(DbError::not_found(Table::AppUsers, user_id));
        }
        self.publish(&[(Table::AppUsers, ChangeKind::Update)]);
        Ok(())
    }
}
