pub mod responses;
pub mod routes;
pub mod server;

pub use server::start_server;
