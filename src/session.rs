//! Keys under which the login flow stores values in the tower-sessions [`Session`](tower_sessions::Session).

/// Subject user id of the logged-in viewer, stored as a hyphenated uuid string.
pub const USER_ID: &str = "user_id";
