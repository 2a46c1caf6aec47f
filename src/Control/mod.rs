//! Free-list/stack control channel: many writers, one reader, no overwrite.

mod channel;
mod reader;
mod writer;

pub mod layout;

pub use channel::{ControlChannel, ControlStats};
pub use reader::ControlReader;
pub use writer::ControlWriter;
