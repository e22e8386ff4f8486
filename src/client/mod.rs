//! Client-side consumption of the match stream

pub mod session;
pub mod snapshot_buffer;

pub use session::{ClientSession, Controls};
pub use snapshot_buffer::{SnapshotBuffer, BUFFER_CAPACITY, RENDER_DELAY_MS};
