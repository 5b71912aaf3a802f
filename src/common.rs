//! Miscellaneous common structs used throughout the library.

mod id;
mod node;
mod time;

pub use id::*;
pub use node::*;
pub use time::*;
