pub mod config;
pub mod entity;
pub mod error;
pub mod memory;
pub mod reading;
pub mod result;
pub mod store;

pub use config::Config;
pub use entity::*;
pub use error::*;
pub use memory::{MemoryReadingSource, MemoryResultStore};
pub use reading::*;
pub use result::*;
pub use store::{ReadingSource, ResultStore};
