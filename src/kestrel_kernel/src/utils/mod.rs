//! Utility
mod prio_bitmap;
mod ring;

pub use self::prio_bitmap::PRIO_BITMAP_MAX_LEN;
pub(crate) use self::{prio_bitmap::PrioBitmap, ring::MessageRing};
