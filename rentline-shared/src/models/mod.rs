pub mod blocks;
pub mod events;
