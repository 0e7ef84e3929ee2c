//! Domain models

pub mod backup;
pub mod codespace;
pub mod component;
pub mod types;
