//! Component and instruction data model.
//!
//! Components are created from configuration at session start and are only
//! mutated by the coordinator and checkpoint manager through the explicit
//! state transitions on [`Component`].
pub mod component;
pub mod instruction;

pub use component::{Component, ComponentOption, InstallState};
pub use instruction::{Action, Instruction};
