pub mod admin;
pub mod sessions;

pub use admin::*;
pub use sessions::*;
