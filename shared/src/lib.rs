mod notification;
mod status;

pub use notification::*;
pub use status::*;
