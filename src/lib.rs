// Module naming follows project convention (KRing = kernel-style ring transport)
#[allow(non_snake_case)]
pub mod KRing;

#[allow(non_snake_case)]
pub mod Control;

#[allow(non_snake_case)]
pub mod Core;

#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod error;
pub mod ffi;

pub use Control::{ControlChannel, ControlReader, ControlWriter};
pub use Core::alloc::RingSetRegistry;
pub use error::{ErrorKind, Result, RingError};
pub use KRing::{
    ControlBuilder, ControlConfig, Handle, Host, Mode, RingId, RingReader, RingSet,
    RingSetBuilder, RingSetConfig, RingWriter,
};
pub use KRing::Structs::{Direction, Message};
