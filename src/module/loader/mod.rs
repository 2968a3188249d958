//! Module loading
//!
//! The [`ModuleLoader`] owns verified bundles, the resolver chain, and the
//! resource streams it has handed out.

pub mod loader;
mod name_lock;
mod resources;

pub use loader::{ModuleLoader, ModuleLoaderBuilder};
pub use resources::ResourceStream;
