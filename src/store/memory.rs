use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{Membership, Message, Role, Room, User};

use super::{Store, StoreError, StoreResult};

/// In-process [`Store`]. Rows are kept in insertion order, which is also
/// creation order, so "newest first" is a reverse scan.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    rooms: Vec<Room>,
    memberships: Vec<Membership>,
    messages: Vec<Message>,
}

impl Tables {
    fn room(&self, id: Uuid) -> StoreResult<&Room> {
        self.rooms.iter().find(|r| r.id == id).ok_or(StoreError::NotFound)
    }

    fn user(&self, id: Uuid) -> StoreResult<&User> {
        self.users.iter().find(|u| u.id == id).ok_or(StoreError::NotFound)
    }

    /// Foreign key check for writes.
    fn references(&self, room_id: Option<Uuid>, user_id: Uuid) -> StoreResult<()> {
        if let Some(room_id) = room_id {
            if self.room(room_id).is_err() {
                return Err(StoreError::MissingReference("room"));
            }
        }
        if self.user(user_id).is_err() {
            return Err(StoreError::MissingReference("user"));
        }
        Ok(())
    }

    fn push_membership(&mut self, room_id: Uuid, user_id: Uuid, role: Role) -> Membership {
        let membership = Membership {
            id: Uuid::now_v7(),
            room_id,
            user_id,
            role,
            created_at: OffsetDateTime::now_utc(),
        };
        self.memberships.push(membership.clone());
        membership
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_room(name: &str, description: Option<&str>) -> Room {
    let now = OffsetDateTime::now_utc();
    Room {
        id: Uuid::now_v7(),
        name: name.to_owned(),
        description: description.map(str::to_owned),
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, username: &str, email: &str, name: &str) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict);
        }

        let user = User {
            id: Uuid::now_v7(),
            username: username.to_owned(),
            email: email.to_owned(),
            name: name.to_owned(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<User> {
        self.tables.read().await.user(id).cloned()
    }

    async fn create_room(&self, name: &str, description: Option<&str>) -> StoreResult<Room> {
        let room = new_room(name, description);
        self.tables.write().await.rooms.push(room.clone());
        Ok(room)
    }

    async fn create_room_with_admin(&self, name: &str, description: Option<&str>, admin: Uuid) -> StoreResult<Room> {
        let mut tables = self.tables.write().await;
        tables.references(None, admin)?;

        let room = new_room(name, description);
        tables.rooms.push(room.clone());
        tables.push_membership(room.id, admin, Role::Admin);
        Ok(room)
    }

    async fn get_room_by_id(&self, id: Uuid) -> StoreResult<Room> {
        self.tables.read().await.room(id).cloned()
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        Ok(self.tables.read().await.rooms.iter().rev().cloned().collect())
    }

    async fn create_membership(&self, room_id: Uuid, user_id: Uuid, role: Role) -> StoreResult<Membership> {
        let mut tables = self.tables.write().await;
        tables.references(Some(room_id), user_id)?;
        if tables.memberships.iter().any(|m| m.room_id == room_id && m.user_id == user_id) {
            return Err(StoreError::Conflict);
        }

        Ok(tables.push_membership(room_id, user_id, role))
    }

    async fn get_memberships_by_room_and_role(&self, room_id: Uuid, role: Role) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        tables
            .memberships
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id && m.role == role)
            .map(|m| tables.user(m.user_id).cloned())
            .collect()
    }

    async fn create_message(&self, room_id: Uuid, author_id: Uuid, content: &str) -> StoreResult<Message> {
        let mut tables = self.tables.write().await;
        tables.references(Some(room_id), author_id)?;

        let message = Message {
            id: Uuid::now_v7(),
            room_id,
            author_id,
            content: content.to_owned(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, room_id: Uuid) -> StoreResult<Vec<Message>> {
        Ok(self
            .tables
            .read()
            .await
            .messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_membership_is_a_conflict() {
        let store = MemoryStore::new();
        let user = store.create_user("ana", "ana@example.com", "Ana").await.unwrap();
        let room = store.create_room("general", None).await.unwrap();

        store.create_membership(room.id, user.id, Role::Admin).await.unwrap();
        let err = store.create_membership(room.id, user.id, Role::Member).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn message_into_missing_room_is_not_found() {
        let store = MemoryStore::new();
        let user = store.create_user("ana", "ana@example.com", "Ana").await.unwrap();

        let err = store.create_message(Uuid::now_v7(), user.id, "hi").await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference("room")));
    }

    #[tokio::test]
    async fn message_from_unknown_author_names_the_user() {
        let store = MemoryStore::new();
        let room = store.create_room("general", None).await.unwrap();

        let err = store.create_message(room.id, Uuid::now_v7(), "hi").await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference("user")));
    }

    #[tokio::test]
    async fn room_with_unknown_admin_is_not_stored() {
        let store = MemoryStore::new();

        let err = store.create_room_with_admin("general", None, Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference("user")));
        assert!(store.list_rooms().await.unwrap().is_empty());
    }
}
