// src/commands/mod.rs
//! Command handlers for the gamestage CLI

mod inspect;
mod install;
mod installed;
pub mod progress;

pub use inspect::{cmd_classify, cmd_platforms};
pub use install::{InstallArgs, cmd_install};
pub use installed::{cmd_launch, cmd_list, cmd_uninstall};
