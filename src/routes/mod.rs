mod auth;
mod gateway;
mod health_check;

pub use auth::{login, logout, refresh, register, AuthResponse};
pub use gateway::{forward_auth, forward_resource, me, Upstreams, USER_ID_HEADER};
pub use health_check::health_check;
