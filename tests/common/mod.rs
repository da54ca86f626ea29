#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chatspace::{
    auth::{Identity, RequestContext},
    broker::LocalBroker,
    db::{Membership, Message, Role, Room, User},
    store::{MemoryStore, Store, StoreResult},
    AppState,
};
use uuid::Uuid;

pub const TICK: Duration = Duration::from_millis(50);

/// [`MemoryStore`] that counts the lookups the hydrator performs.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    pub user_lookups: AtomicUsize,
    pub room_lookups: AtomicUsize,
    pub member_lookups: AtomicUsize,
}

impl CountingStore {
    pub fn lookups(&self) -> (usize, usize, usize) {
        (
            self.user_lookups.load(Ordering::SeqCst),
            self.room_lookups.load(Ordering::SeqCst),
            self.member_lookups.load(Ordering::SeqCst),
        )
    }

    pub fn reset(&self) {
        self.user_lookups.store(0, Ordering::SeqCst);
        self.room_lookups.store(0, Ordering::SeqCst);
        self.member_lookups.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for CountingStore {
    async fn create_user(&self, username: &str, email: &str, name: &str) -> StoreResult<User> {
        self.inner.create_user(username, email, name).await
    }

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<User> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_user_by_id(id).await
    }

    async fn create_room(&self, name: &str, description: Option<&str>) -> StoreResult<Room> {
        self.inner.create_room(name, description).await
    }

    async fn create_room_with_admin(&self, name: &str, description: Option<&str>, admin: Uuid) -> StoreResult<Room> {
        self.inner.create_room_with_admin(name, description, admin).await
    }

    async fn get_room_by_id(&self, id: Uuid) -> StoreResult<Room> {
        self.room_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_room_by_id(id).await
    }

    async fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        self.inner.list_rooms().await
    }

    async fn create_membership(&self, room_id: Uuid, user_id: Uuid, role: Role) -> StoreResult<Membership> {
        self.inner.create_membership(room_id, user_id, role).await
    }

    async fn get_memberships_by_room_and_role(&self, room_id: Uuid, role: Role) -> StoreResult<Vec<User>> {
        self.member_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_memberships_by_room_and_role(room_id, role).await
    }

    async fn create_message(&self, room_id: Uuid, author_id: Uuid, content: &str) -> StoreResult<Message> {
        self.inner.create_message(room_id, author_id, content).await
    }

    async fn list_messages(&self, room_id: Uuid) -> StoreResult<Vec<Message>> {
        self.inner.list_messages(room_id).await
    }
}

pub struct Fixture {
    pub state: AppState,
    pub store: Arc<CountingStore>,
    pub broker: Arc<LocalBroker>,
    pub alice: User,
    pub bob: User,
    pub room: Room,
}

impl Fixture {
    pub fn ctx(&self, user: &User) -> RequestContext {
        RequestContext::authenticated(Identity::new(user.id))
    }
}

/// Alice and Bob, plus a room Alice administers.
pub async fn fixture() -> Fixture {
    init_tracing();

    let store = Arc::new(CountingStore::default());
    let broker = Arc::new(LocalBroker::new(16));
    let state = AppState::new(store.clone(), broker.clone());

    let alice = store.create_user("alice", "alice@example.com", "Alice").await.unwrap();
    let bob = store.create_user("bob", "bob@example.com", "Bob").await.unwrap();
    let room = store.create_room("general", Some("all things")).await.unwrap();
    store.create_membership(room.id, alice.id, Role::Admin).await.unwrap();
    store.reset();

    Fixture { state, store, broker, alice, bob, room }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
