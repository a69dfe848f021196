//! Media session model
//!
//! A session pairs the two RTP endpoints of a call and folds every report seen
//! on them into per-direction sub-records.

pub mod key;
pub mod media_session;

pub use key::MediaKey;
pub use media_session::{Direction, MediaSession, StreamStats};
