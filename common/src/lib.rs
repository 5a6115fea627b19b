mod board;
mod color;
mod models;

pub use board::*;
pub use color::*;
pub use models::*;
