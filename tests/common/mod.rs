mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from flyermap for tests
pub use flyermap::models::{GeoBounds, PolygonFeature, member_color};
pub use flyermap::store::{
    EventKind, MemoryBackend, NewTeamMember, NewZone, STORAGE_KEY, Store, StoreEvent,
    TeamMemberUpdate, ZoneUpdate,
};
