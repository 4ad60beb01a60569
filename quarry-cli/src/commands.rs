pub mod check;
pub mod compact;
pub mod delve;
pub mod index;
pub mod search;
