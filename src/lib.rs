pub mod exchange;
pub mod geo;
pub mod lifecycle;
pub mod models;
pub mod report;
pub mod store;

pub use lifecycle::{ZoneDetailsUpdate, ZoneLifecycle, ZoneStyle};
pub use models::{GeoBounds, LngLat, PolygonFeature, PolygonGeometry, member_color};
pub use store::{
    EventKind, NewTeamMember, NewZone, Store, StoreEvent, TeamMember, TeamMemberUpdate, Zone,
    ZoneUpdate,
};
