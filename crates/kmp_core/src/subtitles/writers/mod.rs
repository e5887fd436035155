//! Subtitle writers.
//!
//! Each writer is a pure function from cues to file content.

mod ass;

pub use ass::{format_ass_time, karaoke_text, to_centis, write_ass, PLAY_RES_X, PLAY_RES_Y, STYLE_NAME};
