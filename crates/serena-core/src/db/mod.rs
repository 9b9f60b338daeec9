// Storage layer: the subscription record model and the store trait every
// backend (memory, SQLx) implements.

pub mod models;
pub mod store;
