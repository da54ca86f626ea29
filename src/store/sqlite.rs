use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{Membership, Message, Role, Room, User},
};

use super::{Store, StoreError, StoreResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    username TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rooms (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memberships (
    id TEXT PRIMARY KEY NOT NULL,
    room_id TEXT NOT NULL REFERENCES rooms(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    role TEXT NOT NULL CHECK (role IN ('admin', 'member')),
    created_at TEXT NOT NULL,
    UNIQUE (room_id, user_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY NOT NULL,
    room_id TEXT NOT NULL REFERENCES rooms(id),
    author_id TEXT NOT NULL REFERENCES users(id),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_by_room ON messages (room_id, created_at);
"#;

const ROOM_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM rooms WHERE id=?)";
const USER_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM users WHERE id=?)";

type UserRow = (String, String, String, String, OffsetDateTime);
type RoomRow = (String, String, Option<String>, OffsetDateTime, OffsetDateTime);
type MessageRow = (String, String, String, String, OffsetDateTime);

/// [`Store`] backed by SQLite through sqlx.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool per `config` and brings the schema up to date.
    pub async fn connect(config: &Config) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound;
        }

        if let Some(db) = err.as_database_error() {
            if db.is_unique_violation() {
                return StoreError::Conflict;
            }
            // a referenced room or user is gone
            if db.is_foreign_key_violation() {
                return StoreError::NotFound;
            }
        }

        StoreError::Other(err.into())
    }
}

/// Checks a referenced row inside the writing transaction, so a foreign key
/// failure can say which side was missing.
async fn require(conn: &mut SqliteConnection, exists: &'static str, entity: &'static str, id: Uuid) -> StoreResult<()> {
    let (found,): (i64,) = sqlx::query_as(exists).bind(id.to_string()).fetch_one(&mut *conn).await?;
    if found == 0 {
        return Err(StoreError::MissingReference(entity));
    }
    Ok(())
}

async fn insert_room(conn: &mut SqliteConnection, room: &Room) -> StoreResult<()> {
    sqlx::query("INSERT INTO rooms (id,name,description,created_at,updated_at) VALUES (?,?,?,?,?)")
        .bind(room.id.to_string())
        .bind(&room.name)
        .bind(&room.description)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_membership(conn: &mut SqliteConnection, membership: &Membership) -> StoreResult<()> {
    sqlx::query("INSERT INTO memberships (id,room_id,user_id,role,created_at) VALUES (?,?,?,?,?)")
        .bind(membership.id.to_string())
        .bind(membership.room_id.to_string())
        .bind(membership.user_id.to_string())
        .bind(membership.role.as_str())
        .bind(membership.created_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
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

fn new_membership(room_id: Uuid, user_id: Uuid, role: Role) -> Membership {
    Membership {
        id: Uuid::now_v7(),
        room_id,
        user_id,
        role,
        created_at: OffsetDateTime::now_utc(),
    }
}

fn uuid(s: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|err| StoreError::Other(err.into()))
}

fn user((id, username, email, name, created_at): UserRow) -> StoreResult<User> {
    Ok(User { id: uuid(&id)?, username, email, name, created_at })
}

fn room((id, name, description, created_at, updated_at): RoomRow) -> StoreResult<Room> {
    Ok(Room { id: uuid(&id)?, name, description, created_at, updated_at })
}

fn message((id, room_id, author_id, content, created_at): MessageRow) -> StoreResult<Message> {
    Ok(Message {
        id: uuid(&id)?,
        room_id: uuid(&room_id)?,
        author_id: uuid(&author_id)?,
        content,
        created_at,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, username: &str, email: &str, name: &str) -> StoreResult<User> {
        let user = User {
            id: Uuid::now_v7(),
            username: username.to_owned(),
            email: email.to_owned(),
            name: name.to_owned(),
            created_at: OffsetDateTime::now_utc(),
        };

        sqlx::query("INSERT INTO users (id,username,email,name,created_at) VALUES (?,?,?,?,?)")
            .bind(user.id.to_string())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;

        Ok(user)
    }

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<User> {
        let row: UserRow = sqlx::query_as("SELECT id,username,email,name,created_at FROM users WHERE id=?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        user(row)
    }

    async fn create_room(&self, name: &str, description: Option<&str>) -> StoreResult<Room> {
        let room = new_room(name, description);
        let mut conn = self.pool.acquire().await?;
        insert_room(&mut conn, &room).await?;
        Ok(room)
    }

    async fn create_room_with_admin(&self, name: &str, description: Option<&str>, admin: Uuid) -> StoreResult<Room> {
        let room = new_room(name, description);

        let mut tx = self.pool.begin().await?;
        require(&mut tx, USER_EXISTS, "user", admin).await?;
        insert_room(&mut tx, &room).await?;
        insert_membership(&mut tx, &new_membership(room.id, admin, Role::Admin)).await?;
        tx.commit().await?;

        Ok(room)
    }

    async fn get_room_by_id(&self, id: Uuid) -> StoreResult<Room> {
        let row: RoomRow = sqlx::query_as("SELECT id,name,description,created_at,updated_at FROM rooms WHERE id=?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        room(row)
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        sqlx::query_as::<_, RoomRow>(
            "SELECT id,name,description,created_at,updated_at FROM rooms ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(room)
        .collect()
    }

    async fn create_membership(&self, room_id: Uuid, user_id: Uuid, role: Role) -> StoreResult<Membership> {
        let membership = new_membership(room_id, user_id, role);

        let mut tx = self.pool.begin().await?;
        require(&mut tx, ROOM_EXISTS, "room", room_id).await?;
        require(&mut tx, USER_EXISTS, "user", user_id).await?;
        insert_membership(&mut tx, &membership).await?;
        tx.commit().await?;

        Ok(membership)
    }

    async fn get_memberships_by_room_and_role(&self, room_id: Uuid, role: Role) -> StoreResult<Vec<User>> {
        sqlx::query_as::<_, UserRow>(
            r#"SELECT u.id,u.username,u.email,u.name,u.created_at
            FROM memberships m JOIN users u ON u.id = m.user_id
            WHERE m.room_id=? AND m.role=?
            ORDER BY m.created_at DESC, m.rowid DESC"#,
        )
        .bind(room_id.to_string())
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(user)
        .collect()
    }

    async fn create_message(&self, room_id: Uuid, author_id: Uuid, content: &str) -> StoreResult<Message> {
        let message = Message {
            id: Uuid::now_v7(),
            room_id,
            author_id,
            content: content.to_owned(),
            created_at: OffsetDateTime::now_utc(),
        };

        let mut tx = self.pool.begin().await?;
        require(&mut tx, ROOM_EXISTS, "room", room_id).await?;
        require(&mut tx, USER_EXISTS, "user", author_id).await?;
        sqlx::query("INSERT INTO messages (id,room_id,author_id,content,created_at) VALUES (?,?,?,?,?)")
            .bind(message.id.to_string())
            .bind(room_id.to_string())
            .bind(author_id.to_string())
            .bind(&message.content)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(message)
    }

    async fn list_messages(&self, room_id: Uuid) -> StoreResult<Vec<Message>> {
        sqlx::query_as::<_, MessageRow>(
            r#"SELECT id,room_id,author_id,content,created_at FROM messages
            WHERE room_id=?
            ORDER BY created_at DESC, rowid DESC"#,
        )
        .bind(room_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(message)
        .collect()
    }
}
