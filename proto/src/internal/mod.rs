//! Internal elements shared with the operation handling layer.

mod error;

pub use self::error::*;
