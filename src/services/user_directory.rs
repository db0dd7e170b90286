//! Staff directory used for operator statistics

use crate::domain::types::{Role, User};
use crate::services::error::StoreError;
use tracing::info;

#[derive(Debug, Default)]
pub struct UserDirectory {
    users: Vec<User>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&mut self, users: Vec<User>) {
        self.users = users;
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn all(&self) -> &[User] {
        &self.users
    }

    /// Active users with the operator role
    pub fn active_operators(&self) -> impl Iterator<Item = &User> {
        self.users.iter().filter(|u| u.role == Role::Operator && u.active)
    }

    pub fn add(&mut self, user: User) -> Result<(), StoreError> {
        if self.get(&user.id).is_some() {
            return Err(StoreError::DuplicateUser(user.id));
        }
        info!(user_id = %user.id, role = ?user.role, "user_added");
        self.users.push(user);
        Ok(())
    }

    pub fn update(&mut self, user: User) -> Result<(), StoreError> {
        let slot = self
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| StoreError::UserNotFound(user.id.clone()))?;
        *slot = user;
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<User, StoreError> {
        let idx = self
            .users
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;
        info!(user_id = %id, "user_removed");
        Ok(self.users.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: Role, active: bool) -> User {
        User {
            id: id.to_string(),
            name: format!("User {}", id),
            login: id.to_string(),
            role,
            active,
        }
    }

    #[test]
    fn test_active_operators_filters_role_and_flag() {
        let mut dir = UserDirectory::new();
        dir.add(user("a", Role::Operator, true)).unwrap();
        dir.add(user("b", Role::Operator, false)).unwrap();
        dir.add(user("c", Role::Supervisor, true)).unwrap();

        let ids: Vec<_> = dir.active_operators().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_crud() {
        let mut dir = UserDirectory::new();
        dir.add(user("a", Role::Operator, true)).unwrap();
        assert!(dir.add(user("a", Role::Operator, true)).is_err());

        let mut edited = user("a", Role::Supervisor, true);
        edited.name = "Bia".to_string();
        dir.update(edited).unwrap();
        assert_eq!(dir.get("a").unwrap().name, "Bia");

        assert_eq!(dir.remove("a").unwrap().id, "a");
        assert_eq!(dir.remove("a").unwrap_err(), StoreError::UserNotFound("a".to_string()));
    }
}
