mod handlers;
mod server;

pub use handlers::{EventBody, HealthQuery, StatusBody};
pub use server::{router, HttpServer, HttpServerBuilder, ServerState};
