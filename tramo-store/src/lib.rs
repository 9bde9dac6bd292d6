pub mod app_config;
pub mod container_repo;
pub mod database;
pub mod events;
pub mod memory;
pub mod route_repo;
pub mod sequence_repo;
pub mod shipment_repo;

pub use app_config::AppConfig;
pub use container_repo::PgContainerStore;
pub use database::DbClient;
pub use events::BroadcastNotifier;
pub use memory::MemoryStore;
pub use route_repo::PgRouteStore;
pub use sequence_repo::PgSequenceStore;
pub use shipment_repo::PgShipmentStore;
