pub mod handlers;
pub mod pool;
pub mod server;

pub use pool::{RenderPermit, RenderPool};
pub use server::{build_router, run, AppState};
