mod poll;
mod sweep;
mod write;

pub use poll::poll;
pub use sweep::sweep;
pub use write::write;
