pub mod config;
pub mod input;
pub mod job;
pub mod mime;
pub mod object_url;
pub mod resolver;
pub mod types;
pub mod validate;

// Keep the public surface small and intentional.
pub use config::*;
pub use input::*;
pub use job::*;
pub use object_url::*;
pub use resolver::*;
pub use types::*;
