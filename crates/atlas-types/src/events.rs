use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ReplicaEntry, Room};

/// Change notifications handed to the sync coordinator after a catalog
/// mutation commits.
///
/// The mutation is already durable by the time an event exists, so a lost
/// or failed fan-out loses nothing the next trigger cannot recover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CatalogEvent {
    /// A room was created or its fields changed in place.
    RoomUpserted { room_id: Uuid, revision: i64 },

    /// A room changed name; every rendered message for it is now stale,
    /// and the external record under the old name has to go.
    RoomRenamed {
        room_id: Uuid,
        revision: i64,
        old_name: String,
    },

    /// A room and its history are gone. Carries the final state of the
    /// room and its replica entries, since neither exists in storage
    /// anymore.
    RoomDeleted {
        room: Room,
        entries: Vec<ReplicaEntry>,
    },

    /// Full re-render requested, for one deployment or all of them.
    GlobalReset { deployment_id: Option<i64> },
}
