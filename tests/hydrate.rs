mod common;

use chatspace::{
    db::{Message, Role},
    hydrate::{MessageRelation, Relation, RoomRelation, Selection},
    store::Store,
    AppError,
};
use time::OffsetDateTime;
use uuid::Uuid;

use common::fixture;

#[tokio::test]
async fn empty_selection_fetches_nothing() {
    let fx = fixture().await;
    let message = fx.store.create_message(fx.room.id, fx.alice.id, "hi").await.unwrap();

    let view = fx.state.hydrator().message(message, &Selection::none()).await;

    assert!(view.author.is_skipped());
    assert!(view.room.is_skipped());
    assert_eq!(fx.store.lookups(), (0, 0, 0));
}

#[tokio::test]
async fn full_selection_fetches_each_relation_once() {
    let fx = fixture().await;
    let message = fx.store.create_message(fx.room.id, fx.alice.id, "hi").await.unwrap();

    let view = fx.state.hydrator().message(message.clone(), &Selection::all()).await;

    assert_eq!(fx.store.lookups(), (1, 1, 0));
    assert_eq!(view.author.loaded().unwrap().id, message.author_id);
    assert_eq!(view.author.loaded().unwrap().name, "Alice");
    assert_eq!(view.room.loaded().unwrap().id, message.room_id);
    assert_eq!(view.room.loaded().unwrap().name, "general");
    assert!(view.field_errors().is_empty());
}

#[tokio::test]
async fn missing_author_fails_only_that_field() {
    let fx = fixture().await;
    let orphan = Message {
        id: Uuid::now_v7(),
        room_id: fx.room.id,
        author_id: Uuid::now_v7(),
        content: "who wrote this".to_owned(),
        created_at: OffsetDateTime::now_utc(),
    };

    let selection = Selection::from_iter([MessageRelation::Author]);
    let view = fx.state.hydrator().message(orphan.clone(), &selection).await;

    assert!(matches!(view.author, Relation::Failed(AppError::RelationshipNotFound { field: "author" })));
    assert!(view.room.is_skipped());
    assert_eq!(fx.store.lookups(), (1, 0, 0));

    // the sibling relation still resolves when it is requested too
    let view = fx.state.hydrator().message(orphan, &Selection::all()).await;
    assert!(view.author.error().is_some());
    assert_eq!(view.room.loaded().unwrap().id, fx.room.id);
    assert_eq!(view.field_errors().len(), 1);
    assert!(view.into_complete().is_err());
}

#[tokio::test]
async fn room_members_and_admins_are_split_by_role_newest_first() {
    let fx = fixture().await;
    let carol = fx.store.create_user("carol", "carol@example.com", "Carol").await.unwrap();
    fx.store.create_membership(fx.room.id, fx.bob.id, Role::Member).await.unwrap();
    fx.store.create_membership(fx.room.id, carol.id, Role::Member).await.unwrap();

    let room = fx.store.get_room_by_id(fx.room.id).await.unwrap();
    fx.store.reset();
    let view = fx.state.hydrator().room(room, &Selection::all()).await;

    let members: Vec<_> = view.members.loaded().unwrap().iter().map(|u| u.id).collect();
    let admins: Vec<_> = view.admins.loaded().unwrap().iter().map(|u| u.id).collect();
    assert_eq!(members, vec![carol.id, fx.bob.id]);
    assert_eq!(admins, vec![fx.alice.id]);
    assert_eq!(fx.store.lookups(), (0, 0, 2));
}

#[tokio::test]
async fn room_selection_bounds_fetches_per_room() {
    let fx = fixture().await;
    fx.store.create_room("random", None).await.unwrap();

    let rooms = fx
        .state
        .list_rooms(&fx.ctx(&fx.alice), &Selection::from_iter([RoomRelation::Admins]))
        .await
        .unwrap();

    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].name, "random");
    assert!(rooms[0].admins.loaded().unwrap().is_empty());
    assert!(rooms.iter().all(|room| room.members.is_skipped()));
    assert_eq!(fx.store.lookups(), (0, 0, 2));
}
