pub mod SharedMemory;
pub mod alloc;
pub mod futex;
pub mod wait;

pub use SharedMemory::{
    attach_shared_memory, create_shared_memory, remove_shared_memory, HeapRegion, RawHandle,
    SharedMemoryBackend,
};
pub use wait::{CondvarWait, FutexChannel, WaitChannel, WaitOutcome, WaitToken};
