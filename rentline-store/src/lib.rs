pub mod app_config;
pub mod database;
pub mod availability_repo;
pub mod booking_repo;
pub mod discount_repo;
pub mod redis_repo;
pub mod routing;

pub use app_config::Config;
pub use availability_repo::PgAvailabilityStore;
pub use booking_repo::{PgBookingRepository, PgHoldRepository};
pub use database::DbClient;
pub use discount_repo::PgDiscountCatalog;
pub use redis_repo::RedisClient;
pub use routing::HttpRouting;
