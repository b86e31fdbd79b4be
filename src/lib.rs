//! pentlyas: a music macro language assembler for the Pently NES audio engine.

pub mod config;
pub mod mml;
