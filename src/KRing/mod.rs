mod builder;
mod reader;
mod ringset;
mod writer;

pub mod Descriptor;

pub use builder::{ControlBuilder, ControlConfig, Host, RingSetBuilder, RingSetConfig};
pub use reader::RingReader;
pub use ringset::{validate_name, Handle, Mode, RingId, RingSet};
pub use writer::RingWriter;

pub(crate) use ringset::{allocate_region, checked_header, wait_channel_for};

pub mod Buffer {
    pub mod Ring;
    pub mod Ring_impl;
    pub mod arena;
    pub mod layout;
    pub use Ring::RingStats; // re-export for stable path
}

pub mod Structs {
    pub mod Message_Structs;
    pub use Message_Structs::{
        DecryptedView, Direction, Message, PacketView, PlainView, SlotHeader,
    }; // re-export for stable path
}
