use axum::{routing::post, Router};

use crate::db::Engine;
use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod repo_types;

pub use repo::{PgUserRepository, UserRepository};
pub use repo_types::{NewUser, User};

pub fn router<E, U>() -> Router<AppState<E, U>>
where
    E: Engine,
    U: UserRepository<E::Session> + 'static,
{
    Router::new().route("/register", post(handlers::register::<E, U>))
}
