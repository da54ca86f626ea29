//! Shaping stored entities into response views, fetching a relationship only
//! when the caller's query asked for it.
//!
//! Relationships of one entity are independent: they are fetched
//! concurrently and each one succeeds or fails on its own, so a missing
//! author never hides a room that resolved fine. Entities in a list are
//! hydrated independently of each other; nothing is batched across them.

use std::{collections::HashSet, future::Future, hash::Hash, sync::Arc};

use futures_util::future::join_all;
use serde::{Serialize, Serializer};
use time::OffsetDateTime;
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    db::{Message, Role, Room, User},
    store::{Store, StoreError, StoreResult},
    AppError, AppResult,
};

/// A nested field of an entity that costs a secondary fetch.
pub trait Relationship: Copy + Eq + Hash + Send + Sync + 'static {
    const ALL: &'static [Self];

    /// Maps a field name from the caller's query; scalar fields map to `None`.
    fn from_field(name: &str) -> Option<Self>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRelation {
    Author,
    Room,
}

impl Relationship for MessageRelation {
    const ALL: &'static [Self] = &[Self::Author, Self::Room];

    fn from_field(name: &str) -> Option<Self> {
        // "user" and "space" are the names older clients query for
        match name {
            "author" | "user" => Some(Self::Author),
            "room" | "space" => Some(Self::Room),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomRelation {
    Members,
    Admins,
}

impl Relationship for RoomRelation {
    const ALL: &'static [Self] = &[Self::Members, Self::Admins];

    fn from_field(name: &str) -> Option<Self> {
        match name {
            "members" => Some(Self::Members),
            "admins" => Some(Self::Admins),
            _ => None,
        }
    }
}

/// Relationships requested for one entity. Lives for a single resolve call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<R: Relationship> {
    relations: HashSet<R>,
}

impl<R: Relationship> Default for Selection<R> {
    fn default() -> Self {
        Self { relations: HashSet::new() }
    }
}

impl<R: Relationship> FromIterator<R> for Selection<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self { relations: iter.into_iter().collect() }
    }
}

impl<R: Relationship> Selection<R> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        R::ALL.iter().copied().collect()
    }

    /// Builds a selection from the field names of the caller's query.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        fields
            .into_iter()
            .filter_map(|field| R::from_field(field.as_ref()))
            .collect()
    }

    pub fn contains(&self, relation: R) -> bool {
        self.relations.contains(&relation)
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Outcome of one relationship of a hydrated view.
#[derive(Debug)]
pub enum Relation<T> {
    /// Not requested, never fetched.
    Skipped,
    Loaded(T),
    Failed(AppError),
}

impl<T> Relation<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Relation::Skipped)
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Relation::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            Relation::Failed(err) => Some(err),
            _ => None,
        }
    }

    fn take_error(&mut self) -> Option<AppError> {
        if !matches!(self, Relation::Failed(_)) {
            return None;
        }
        match std::mem::replace(self, Relation::Skipped) {
            Relation::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for Relation<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Relation::Loaded(value) => value.serialize(serializer),
            _ => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,

    #[serde(skip_serializing_if = "Relation::is_skipped")]
    pub members: Relation<Vec<UserView>>,
    #[serde(skip_serializing_if = "Relation::is_skipped")]
    pub admins: Relation<Vec<UserView>>,
}

impl RoomView {
    fn bare(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            description: room.description,
            created_at: room.created_at,
            updated_at: room.updated_at,
            members: Relation::Skipped,
            admins: Relation::Skipped,
        }
    }

    pub fn field_errors(&self) -> Vec<(&'static str, &AppError)> {
        [("members", self.members.error()), ("admins", self.admins.error())]
            .into_iter()
            .filter_map(|(field, err)| Some((field, err?)))
            .collect()
    }

    /// All-or-nothing view of the hydration: the first failed relationship, if any.
    pub fn into_complete(mut self) -> AppResult<Self> {
        match self.members.take_error().or_else(|| self.admins.take_error()) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author_id: Uuid,
    pub room_id: Uuid,

    #[serde(skip_serializing_if = "Relation::is_skipped")]
    pub author: Relation<UserView>,
    #[serde(skip_serializing_if = "Relation::is_skipped")]
    pub room: Relation<RoomView>,
}

impl MessageView {
    pub fn field_errors(&self) -> Vec<(&'static str, &AppError)> {
        [("author", self.author.error()), ("room", self.room.error())]
            .into_iter()
            .filter_map(|(field, err)| Some((field, err?)))
            .collect()
    }

    pub fn into_complete(mut self) -> AppResult<Self> {
        match self.author.take_error().or_else(|| self.room.take_error()) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

#[derive(Clone)]
pub struct Hydrator {
    store: Arc<dyn Store>,
}

impl Hydrator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn message(&self, message: Message, selection: &Selection<MessageRelation>) -> MessageView {
        let (author, room) = tokio::join!(
            relation(selection.contains(MessageRelation::Author), "author", async {
                self.store.get_user_by_id(message.author_id).await.map(UserView::from)
            }),
            relation(selection.contains(MessageRelation::Room), "room", async {
                self.store.get_room_by_id(message.room_id).await.map(RoomView::bare)
            }),
        );

        MessageView {
            id: message.id,
            content: message.content,
            created_at: message.created_at,
            author_id: message.author_id,
            room_id: message.room_id,
            author,
            room,
        }
    }

    pub async fn messages(&self, messages: Vec<Message>, selection: &Selection<MessageRelation>) -> Vec<MessageView> {
        join_all(messages.into_iter().map(|message| self.message(message, selection))).await
    }

    pub async fn room(&self, room: Room, selection: &Selection<RoomRelation>) -> RoomView {
        let room_id = room.id;
        let (members, admins) = tokio::join!(
            relation(selection.contains(RoomRelation::Members), "members", self.users_with_role(room_id, Role::Member)),
            relation(selection.contains(RoomRelation::Admins), "admins", self.users_with_role(room_id, Role::Admin)),
        );

        RoomView { members, admins, ..RoomView::bare(room) }
    }

    pub async fn rooms(&self, rooms: Vec<Room>, selection: &Selection<RoomRelation>) -> Vec<RoomView> {
        join_all(rooms.into_iter().map(|room| self.room(room, selection))).await
    }

    async fn users_with_role(&self, room_id: Uuid, role: Role) -> StoreResult<Vec<UserView>> {
        let users = self.store.get_memberships_by_room_and_role(room_id, role).await?;
        Ok(users.into_iter().map(UserView::from).collect())
    }
}

/// Runs `fetch` only when the relationship was requested.
async fn relation<T>(
    wanted: bool,
    field: &'static str,
    fetch: impl Future<Output = StoreResult<T>>,
) -> Relation<T> {
    if !wanted {
        return Relation::Skipped;
    }

    match fetch.await {
        Ok(value) => {
            debug!(field, "relationship loaded");
            Relation::Loaded(value)
        }
        Err(StoreError::NotFound) => {
            error!(field, "relationship points at a missing record");
            Relation::Failed(AppError::RelationshipNotFound { field })
        }
        Err(err) => {
            error!(field, error = %err, "failed to load relationship");
            Relation::Failed(AppError::Storage(err.into()))
        }
    }
}
