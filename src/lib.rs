pub mod codec;
pub mod config;
pub mod error;
pub mod messages;
pub mod room;
pub mod routes;
pub mod server;
pub mod tls;

pub use config::Config;
pub use routes::routes;
pub use server::Server;
