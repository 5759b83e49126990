mod interface;
mod thread;

pub use interface::*;
pub use thread::*;
