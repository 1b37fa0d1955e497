// User administration: listing users and changing their roles.

use std::sync::Arc;

use gavel_core::db::Database;
use gavel_core::model::{AppUser, Provider, Role};
use serde::Serialize;

use super::LastError;
use crate::error::{ServiceError, ServiceResult};
use crate::identity::Session;

const SERVICE: &str = "users";

/// Users per role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total: usize,
    pub admins: usize,
    pub users: usize,
    pub viewers: usize,
}

pub struct UsersService {
    db: Arc<Database>,
    users: Vec<AppUser>,
    last_error: LastError,
}

impl UsersService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            users: Vec::new(),
            last_error: LastError::default(),
        }
    }

    pub fn users(&self) -> &[AppUser] {
        &self.users
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.get()
    }

    pub fn clear_error(&mut self) {
        self.last_error.clear();
    }

    pub fn get_users(&mut self) -> ServiceResult<Vec<AppUser>> {
        let result = self.db.list_users().map_err(ServiceError::from);
        let users = self.last_error.record(SERVICE, result)?;
        self.users = users.clone();
        Ok(users)
    }

    /// Change `target_user_id`'s role on behalf of `actor`. Only admins may
    /// do this, and an admin may not take the admin role away from
    /// themselves.
    pub fn update_user_role(
        &mut self,
        actor: &Session,
        target_user_id: &str,
        role: Role,
    ) -> ServiceResult<AppUser> {
        let result = if !actor.is_admin() {
            Err(ServiceError::PermissionDenied(format!(
                "{} may not change roles",
                actor.email
            )))
        } else if actor.user_id == target_user_id && role != Role::Admin {
            Err(ServiceError::SelfDemotion)
        } else {
            self.db
                .update_user_role(target_user_id, role)
                .map_err(ServiceError::from)
        };
        let updated = self.last_error.record(SERVICE, result)?;
        if let Some(cached) = self.users.iter_mut().find(|u| u.user_id == target_user_id) {
            *cached = updated.clone();
        }
        Ok(updated)
    }

    /// Cached users whose email, role or provider contains `term`, ignoring
    /// case. A blank term matches everyone.
    pub fn filter_users(&self, term: &str) -> Vec<AppUser> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.users.clone();
        }
        self.users
            .iter()
            .filter(|u| {
                u.email.to_lowercase().contains(&term)
                    || u.role.as_str().contains(&term)
                    || u.provider.as_str().to_lowercase().contains(&term)
            })
            .cloned()
            .collect()
    }

    pub fn user_stats(&self) -> UserStats {
        let mut stats = UserStats {
            total: self.users.len(),
            ..UserStats::default()
        };
        for user in &self.users {
            match user.role {
                Role::Admin => stats.admins += 1,
                Role::User => stats.users += 1,
                Role::Viewer => stats.viewers += 1,
            }
        }
        stats
    }
}

pub fn role_label(role: Role) -> &'static str {
    role.label()
}

pub fn provider_label(provider: &Provider) -> &str {
    provider.label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::model::NewAppUser;

    fn seeded() -> (Arc<Database>, UsersService) {
        let db = Arc::new(Database::open(":memory:").expect("in-memory database should open"));
        for (id, email, provider, role) in [
            ("u-boss", "boss@example.com", Provider::Google, Role::Admin),
            ("u-fan", "fan@example.com", Provider::Email, Role::User),
            ("u-tv", "tv@example.com", Provider::Github, Role::Viewer),
        ] {
            db.upsert_user(&NewAppUser {
                user_id: id.into(),
                email: email.into(),
                provider,
                email_confirmed: true,
                role,
            })
            .unwrap();
        }
        let mut service = UsersService::new(db.clone());
        service.get_users().unwrap();
        (db, service)
    }

    fn actor(user_id: &str, role: Role) -> Session {
        Session {
            user_id: user_id.into(),
            email: format!("{user_id}@example.com"),
            role,
        }
    }

    #[test]
    fn admin_can_promote_others() {
        let (db, mut users) = seeded();
        let updated = users
            .update_user_role(&actor("u-boss", Role::Admin), "u-fan", Role::Admin)
            .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(db.get_user("u-fan").unwrap().role, Role::Admin);
        assert_eq!(users.user_stats().admins, 2);
    }

    #[test]
    fn non_admin_is_refused() {
        let (db, mut users) = seeded();
        let err = users
            .update_user_role(&actor("u-fan", Role::User), "u-tv", Role::Admin)
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
        assert_eq!(db.get_user("u-tv").unwrap().role, Role::Viewer);
        assert!(users.last_error().is_some());
    }

    #[test]
    fn admin_cannot_demote_self() {
        let (db, mut users) = seeded();
        let err = users
            .update_user_role(&actor("u-boss", Role::Admin), "u-boss", Role::Viewer)
            .unwrap_err();
        assert!(matches!(err, ServiceError::SelfDemotion));
        assert_eq!(db.get_user("u-boss").unwrap().role, Role::Admin);
    }

    #[test]
    fn unknown_target_is_an_error() {
        let (_, mut users) = seeded();
        assert!(users
            .update_user_role(&actor("u-boss", Role::Admin), "nobody", Role::User)
            .is_err());
    }

    #[test]
    fn filter_and_stats() {
        let (_, users) = seeded();
        assert_eq!(users.filter_users("").len(), 3);
        assert_eq!(users.filter_users("FAN").len(), 1);
        assert_eq!(users.filter_users("viewer")[0].user_id, "u-tv");
        assert_eq!(users.filter_users("github")[0].user_id, "u-tv");

        assert_eq!(
            users.user_stats(),
            UserStats {
                total: 3,
                admins: 1,
                users: 1,
                viewers: 1
            }
        );
    }

    #[test]
    fn labels() {
        assert_eq!(role_label(Role::Viewer), "Viewer");
        assert_eq!(provider_label(&Provider::Email), "Email/Password");
        assert_eq!(provider_label(&Provider::Other(String::new())), "Unknown");
    }
}
