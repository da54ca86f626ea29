mod common;

use std::{
    io,
    sync::{Arc, Mutex},
};

use chatspace::hydrate::Selection;

use common::fixture;

/// Collects formatted log lines in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn message_ids_are_logged_under_their_own_key() {
    let fx = fixture().await;
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    fx.broker.shutdown();
    let sent = fx
        .state
        .send_message(&fx.ctx(&fx.alice), fx.room.id, "hi", &Selection::none())
        .await
        .unwrap();

    let logs = captured.text();
    let field = format!("message_id={}", sent.message.id);
    let stored = logs.lines().find(|l| l.contains("message stored")).unwrap();
    let failed = logs.lines().find(|l| l.contains("live notification failed")).unwrap();
    assert!(stored.contains(&field));
    assert!(failed.contains(&field));
}
