pub mod encoding;
pub mod sanity;
pub mod time_frame;

pub use self::{
    encoding::SignatureEncodingChecker, sanity::SanityChecker, time_frame::TimeFrameFilter,
};
