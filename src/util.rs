pub mod escape;
pub mod pack;
pub mod varint;
