// src/registry/mod.rs
//! Read-only registries consulted by every stage
//!
//! Both registries are constructed explicitly and passed by reference into
//! the components that need them.

mod platform;
mod profile;

pub use platform::{InstallMethod, PlatformDescriptor, PlatformRegistry};
pub use profile::{LaunchProfile, LaunchProfileRegistry};
