pub mod repo;
pub mod repo_types;

pub use repo::{OrderRepository, PgOrderRepository};
pub use repo_types::{NewOrder, Order};
