pub mod counts;
pub mod events;
