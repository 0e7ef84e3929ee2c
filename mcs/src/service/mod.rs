//! Service layer

pub mod backup;
pub mod codespace;
pub mod compose;
pub mod image_selector;
pub mod naming;
pub mod ownership;
pub mod resources;
