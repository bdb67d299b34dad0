pub mod config;
pub mod persistence;
pub mod protocol;
pub mod server;

pub use config::*;
pub use persistence::*;
pub use protocol::*;
pub use server::*;
