//! Fixtures shared by the tool tests.

use crate::{ToolDeps, ToolSettings};
use settlr_core::geo::{Coordinate, Ring};
use settlr_core::message::ConversationId;
use settlr_core::notify::{MapEvent, MapNotifier};
use settlr_core::region::Region;
use settlr_core::store::{GeoStore, HistoryStore};
use settlr_store::InMemoryStore;
use std::sync::{Arc, Mutex};

pub use settlr_test_utils::ScriptedProvider;

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<MapEvent>>,
}

impl RecordingNotifier {
    pub fn taken(&self) -> Vec<MapEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl MapNotifier for RecordingNotifier {
    fn notify(&self, event: MapEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn test_deps(
    provider: Arc<ScriptedProvider>,
) -> (ToolDeps, Arc<InMemoryStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let deps = ToolDeps {
        provider,
        store: store.clone(),
        notifier: notifier.clone(),
        settings: ToolSettings::default(),
    };
    (deps, store, notifier)
}

/// Unit square around Shoreditch: lon -0.08..-0.07, lat 51.52..51.53.
pub fn square() -> Ring {
    Ring::new(vec![
        Coordinate::new(-0.08, 51.52),
        Coordinate::new(-0.08, 51.53),
        Coordinate::new(-0.07, 51.53),
        Coordinate::new(-0.07, 51.52),
    ])
    .unwrap()
}

/// Create conversation `id` with one region covering [`square`].
pub async fn seeded_region(store: &InMemoryStore, id: &str) -> Region {
    let conversation_id = ConversationId::from(id);
    store
        .create_conversation(&conversation_id, "Tell me about Shoreditch")
        .await
        .unwrap();
    store
        .insert_region(&conversation_id, "Shoreditch", &square())
        .await
        .unwrap()
}
