pub mod handlers;
pub mod server;

pub use server::{ApiState, build_router, serve};
