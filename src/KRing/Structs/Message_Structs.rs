// Message headers written at offset 0 of a slot, and borrowed views over them.

// no atomics here; plain integral fields keep the layout readable from C

use std::mem::size_of;
use std::ptr;

pub const KIND_PACKET: u8 = 1;
pub const KIND_DECRYPTED: u8 = 2;
pub const KIND_PLAIN: u8 = 3;

/// Host field size, NUL included.
pub const HOST_LEN: usize = 64;

/// Common prefix of every message header.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotHeader {
    pub len: u32,
    pub kind: u8,
    pub _pad: [u8; 3],
}

/// `len` is the original packet length, `caplen` the bytes stored in this slot.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub common: SlotHeader,
    pub caplen: u32,
    pub dir: u8,
    pub _pad: [u8; 3],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecryptedHeader {
    pub common: SlotHeader,
    pub id: i64,
    pub side: u8,
    pub host: [u8; HOST_LEN],
    pub _pad: [u8; 7],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlainHeader {
    pub common: SlotHeader,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Inside, towards the client.
    Client = 1,
    /// Outside, towards the server.
    Server = 2,
}

impl Direction {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Direction::Client),
            2 => Some(Direction::Server),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PacketView<'a> {
    pub dir: Direction,
    /// Original length of the packet, possibly more than `bytes.len()`.
    pub len: usize,
    pub caplen: usize,
    pub bytes: &'a [u8],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecryptedView<'a> {
    pub id: i64,
    pub side: u8,
    pub host: &'a str,
    pub bytes: &'a [u8],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlainView<'a> {
    pub bytes: &'a [u8],
}

/// A message borrowed from a claimed slot.
///
/// `Raw` covers slots filled through `write_first`/`write_second` without one
/// of the known headers; it exposes the whole slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Message<'a> {
    Packet(PacketView<'a>),
    Decrypted(DecryptedView<'a>),
    Plain(PlainView<'a>),
    Raw(&'a [u8]),
}

impl<'a> Message<'a> {
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            Message::Packet(p) => p.bytes,
            Message::Decrypted(d) => d.bytes,
            Message::Plain(p) => p.bytes,
            Message::Raw(b) => b,
        }
    }

    pub fn kind(&self) -> Option<u8> {
        match self {
            Message::Packet(_) => Some(KIND_PACKET),
            Message::Decrypted(_) => Some(KIND_DECRYPTED),
            Message::Plain(_) => Some(KIND_PLAIN),
            Message::Raw(_) => None,
        }
    }
}

/// Payload bytes a slot of `slot_size` can carry behind a header of kind `kind`.
pub fn payload_capacity(slot_size: usize, kind: u8) -> usize {
    slot_size.saturating_sub(header_len(kind))
}

pub fn header_len(kind: u8) -> usize {
    match kind {
        KIND_PACKET => size_of::<PacketHeader>(),
        KIND_DECRYPTED => size_of::<DecryptedHeader>(),
        _ => size_of::<PlainHeader>(),
    }
}

fn store_payload(slot: &mut [u8], offset: usize, data: &[u8]) -> usize {
    let n = data.len().min(slot.len().saturating_sub(offset));
    slot[offset..offset + n].copy_from_slice(&data[..n]);
    n
}

/// Write a packet header and as much of `data` as fits. Returns the bytes stored.
pub fn encode_packet(slot: &mut [u8], dir: Direction, data: &[u8], total_len: usize) -> usize {
    let off = size_of::<PacketHeader>();
    assert!(slot.len() >= off, "slot smaller than packet header");
    let caplen = store_payload(slot, off, data);
    let header = PacketHeader {
        common: SlotHeader {
            len: total_len.min(u32::MAX as usize) as u32,
            kind: KIND_PACKET,
            _pad: [0; 3],
        },
        caplen: caplen as u32,
        dir: dir as u8,
        _pad: [0; 3],
    };
    unsafe { ptr::write_unaligned(slot.as_mut_ptr() as *mut PacketHeader, header) };
    caplen
}

/// `host` is cut to 63 bytes on a character boundary.
pub fn encode_decrypted(slot: &mut [u8], id: i64, side: u8, host: Option<&str>, data: &[u8]) -> usize {
    let off = size_of::<DecryptedHeader>();
    assert!(slot.len() >= off, "slot smaller than decrypted header");
    let stored = store_payload(slot, off, data);

    let mut host_buf = [0u8; HOST_LEN];
    if let Some(h) = host {
        let mut n = h.len().min(HOST_LEN - 1);
        while !h.is_char_boundary(n) {
            n -= 1;
        }
        host_buf[..n].copy_from_slice(&h.as_bytes()[..n]);
    }

    let header = DecryptedHeader {
        common: SlotHeader {
            len: stored as u32,
            kind: KIND_DECRYPTED,
            _pad: [0; 3],
        },
        id,
        side,
        host: host_buf,
        _pad: [0; 7],
    };
    unsafe { ptr::write_unaligned(slot.as_mut_ptr() as *mut DecryptedHeader, header) };
    stored
}

pub fn encode_plain(slot: &mut [u8], data: &[u8]) -> usize {
    let off = size_of::<PlainHeader>();
    assert!(slot.len() >= off, "slot smaller than plain header");
    let stored = store_payload(slot, off, data);
    seal_plain(slot, stored)
}

/// Write a plain header over a payload already placed after it. `len` is
/// clamped to the slot. Returns the length recorded.
pub fn seal_plain(slot: &mut [u8], len: usize) -> usize {
    let off = size_of::<PlainHeader>();
    assert!(slot.len() >= off, "slot smaller than plain header");
    let len = len.min(slot.len() - off);
    let header = PlainHeader {
        common: SlotHeader {
            len: len as u32,
            kind: KIND_PLAIN,
            _pad: [0; 3],
        },
    };
    unsafe { ptr::write_unaligned(slot.as_mut_ptr() as *mut PlainHeader, header) };
    len
}

fn payload_at(slot: &[u8], offset: usize, len: usize) -> &[u8] {
    let end = offset.saturating_add(len).min(slot.len());
    &slot[offset.min(end)..end]
}

fn host_str(raw: &[u8; HOST_LEN]) -> &str {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(HOST_LEN);
    match std::str::from_utf8(&raw[..end]) {
        Ok(s) => s,
        Err(e) => std::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
    }
}

/// Interpret a claimed slot. Lengths are clamped to the slot.
pub fn decode(slot: &[u8]) -> Message<'_> {
    if slot.len() < size_of::<SlotHeader>() {
        return Message::Raw(slot);
    }
    let common = unsafe { ptr::read_unaligned(slot.as_ptr() as *const SlotHeader) };
    match common.kind {
        KIND_PACKET if slot.len() >= size_of::<PacketHeader>() => {
            let h = unsafe { ptr::read_unaligned(slot.as_ptr() as *const PacketHeader) };
            let Some(dir) = Direction::from_u8(h.dir) else {
                return Message::Raw(slot);
            };
            let bytes = payload_at(slot, size_of::<PacketHeader>(), h.caplen as usize);
            Message::Packet(PacketView {
                dir,
                len: h.common.len as usize,
                caplen: bytes.len(),
                bytes,
            })
        }
        KIND_DECRYPTED if slot.len() >= size_of::<DecryptedHeader>() => {
            let base = slot.as_ptr() as *const DecryptedHeader;
            let (id, side, len) = unsafe {
                let h = ptr::read_unaligned(base);
                (h.id, h.side, h.common.len as usize)
            };
            // Borrow the host field in place so the view can hand out a &str.
            let host_raw: &[u8; HOST_LEN] = unsafe {
                &*(slot.as_ptr().add(std::mem::offset_of!(DecryptedHeader, host)) as *const [u8; HOST_LEN])
            };
            Message::Decrypted(DecryptedView {
                id,
                side,
                host: host_str(host_raw),
                bytes: payload_at(slot, size_of::<DecryptedHeader>(), len),
            })
        }
        KIND_PLAIN => Message::Plain(PlainView {
            bytes: payload_at(slot, size_of::<PlainHeader>(), common.len as usize),
        }),
        _ => Message::Raw(slot),
    }
}
