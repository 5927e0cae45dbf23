//! Room registry.
//!
//! The registry is the authoritative store of rooms. A room's member set
//! lives in its registry record, so the member count reported by listings
//! is always the size of that set. Only the membership manager mutates it,
//! through [`RoomRegistry::with_room_mut`], which holds the room's exclusive
//! lock for the duration of the mutation.

use crate::error::LobbyError;
use crate::message::now_millis;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum room name length in characters.
pub const MAX_ROOM_NAME_LENGTH: usize = 64;

/// Creator recorded when the request carries none.
pub const ANONYMOUS_CREATOR: &str = "anonymous";

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Largest capacity a room may be created with.
    pub max_room_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_room_capacity: 1000,
        }
    }
}

/// A snapshot of a room, as exposed to lobby listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub max_members: usize,
    pub current_members: usize,
    pub created_by: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Usernames currently in the room, sorted.
    pub members: Vec<String>,
}

impl Room {
    /// Whether the room has reached capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.current_members >= self.max_members
    }
}

/// Registry record for a room.
#[derive(Debug)]
pub(crate) struct RoomRecord {
    pub(crate) id: String,
    name: String,
    pub(crate) max_members: usize,
    created_by: String,
    created_at: u64,
    seq: u64,
    pub(crate) members: BTreeSet<String>,
}

impl RoomRecord {
    pub(crate) fn snapshot(&self) -> Room {
        Room {
            id: self.id.clone(),
            name: self.name.clone(),
            max_members: self.max_members,
            current_members: self.members.len(),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
            members: self.members.iter().cloned().collect(),
        }
    }
}

/// The room registry.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomRecord>,
    next_seq: AtomicU64,
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create an empty registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            next_seq: AtomicU64::new(0),
            config,
        }
    }

    /// Create a room.
    ///
    /// The name is trimmed. An empty `created_by` is recorded as
    /// [`ANONYMOUS_CREATOR`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` for an empty or overlong name and
    /// `InvalidCapacity` when `max_members` is below 1 or above the
    /// configured ceiling.
    pub fn create_room(
        &self,
        name: &str,
        max_members: i64,
        created_by: &str,
    ) -> Result<Room, LobbyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LobbyError::InvalidName("room name cannot be empty"));
        }
        if name.chars().count() > MAX_ROOM_NAME_LENGTH {
            return Err(LobbyError::InvalidName("room name too long"));
        }

        let capacity = usize::try_from(max_members)
            .ok()
            .filter(|&n| n >= 1 && n <= self.config.max_room_capacity)
            .ok_or(LobbyError::InvalidCapacity {
                requested: max_members,
                max: self.config.max_room_capacity,
            })?;

        let created_by = match created_by.trim() {
            "" => ANONYMOUS_CREATOR,
            creator => creator,
        };

        let record = RoomRecord {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            max_members: capacity,
            created_by: created_by.to_string(),
            created_at: now_millis(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            members: BTreeSet::new(),
        };
        let room = record.snapshot();

        info!(
            room = %room.id,
            name = %room.name,
            capacity,
            creator = %room.created_by,
            "Room created"
        );
        self.rooms.insert(record.id.clone(), record);

        Ok(room)
    }

    /// List all rooms in creation order.
    #[must_use]
    pub fn list_rooms(&self) -> Vec<Room> {
        let mut records: Vec<(u64, Room)> = self
            .rooms
            .iter()
            .map(|r| (r.seq, r.snapshot()))
            .collect();
        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, room)| room).collect()
    }

    /// Get a room by id.
    ///
    /// # Errors
    ///
    /// Returns `RoomNotFound` if there is no such room.
    pub fn get_room(&self, id: &str) -> Result<Room, LobbyError> {
        self.rooms
            .get(id)
            .map(|r| r.snapshot())
            .ok_or_else(|| LobbyError::RoomNotFound(id.to_string()))
    }

    /// Remove a room, returning its final snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RoomNotFound` if there is no such room.
    pub fn delete_room(&self, id: &str) -> Result<Room, LobbyError> {
        let (_, record) = self
            .rooms
            .remove(id)
            .ok_or_else(|| LobbyError::RoomNotFound(id.to_string()))?;
        debug!(room = %id, members = record.members.len(), "Room deleted");
        Ok(record.snapshot())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.rooms.contains_key(id)
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Run `f` with exclusive access to a room record.
    ///
    /// All mutations of a room's member set go through here, so they are
    /// serialized per room.
    pub(crate) fn with_room_mut<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut RoomRecord) -> Result<R, LobbyError>,
    ) -> Result<R, LobbyError> {
        let mut record = self
            .rooms
            .get_mut(id)
            .ok_or_else(|| LobbyError::RoomNotFound(id.to_string()))?;
        f(&mut *record)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
