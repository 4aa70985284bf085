pub mod common;
pub mod decompile;
pub mod dump;
pub mod instructions;
