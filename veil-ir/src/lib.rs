#![forbid(unsafe_code)]

pub mod ir;
pub mod printer;

pub use ir::*;
pub use printer::*;
