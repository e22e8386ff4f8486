//! Room codes and room membership bookkeeping

pub mod code;
pub mod manager;

pub use manager::{Membership, PlayerSlot, Room, RoomError, RoomManager, Seat};
