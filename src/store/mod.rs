//! Persistence contract consumed by the chat core, plus two implementations.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{Membership, Message, Role, Room, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// A write referenced a row that doesn't exist; names which one.
    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),

    #[error("record already exists")]
    Conflict,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, username: &str, email: &str, name: &str) -> StoreResult<User>;

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<User>;

    async fn create_room(&self, name: &str, description: Option<&str>) -> StoreResult<Room>;

    /// Creates the room and `admin`'s admin membership atomically. Nothing
    /// is stored when the user doesn't exist.
    async fn create_room_with_admin(&self, name: &str, description: Option<&str>, admin: Uuid) -> StoreResult<Room>;

    async fn get_room_by_id(&self, id: Uuid) -> StoreResult<Room>;

    /// Newest first.
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;

    /// Fails with [`StoreError::Conflict`] when the user already belongs to
    /// the room and with [`StoreError::MissingReference`] when the room or
    /// user doesn't exist.
    async fn create_membership(&self, room_id: Uuid, user_id: Uuid, role: Role) -> StoreResult<Membership>;

    /// Users holding `role` in the room, most recently joined first.
    async fn get_memberships_by_room_and_role(&self, room_id: Uuid, role: Role) -> StoreResult<Vec<User>>;

    /// Fails with [`StoreError::MissingReference`] naming the room or author.
    async fn create_message(&self, room_id: Uuid, author_id: Uuid, content: &str) -> StoreResult<Message>;

    /// Newest first.
    async fn list_messages(&self, room_id: Uuid) -> StoreResult<Vec<Message>>;
}
