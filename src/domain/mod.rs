pub mod cursor;
pub mod entities;
pub mod errors;
pub mod queue;
pub mod repositories;
pub mod services;
pub mod subscription;
pub mod value_objects;

pub use cursor::*;
pub use entities::*;
pub use errors::*;
pub use queue::*;
pub use repositories::*;
pub use services::*;
pub use subscription::*;
pub use value_objects::*;
