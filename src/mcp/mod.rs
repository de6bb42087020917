//! Model Context Protocol server core: tool/resource/prompt catalog and the
//! method dispatcher shared by both HTTP transports.

pub mod builtin;
pub mod catalog;
pub mod dispatch;
pub mod features;
pub mod prompts;
pub mod registry;
pub mod resources;
pub mod rest_crud;
pub mod tool;
pub mod types;

pub use catalog::{Catalog, Initializer, Registrar};
pub use dispatch::Dispatcher;
pub use registry::{RegistrationError, ToolRegistry};
