#![doc = include_str!("../README.md")]

mod code;
mod coin;
mod error;
mod line;
mod resolver;
mod tables;

pub use crate::code::*;
pub use crate::coin::*;
pub use crate::error::*;
pub use crate::line::*;
pub use crate::resolver::*;
pub use crate::tables::*;
