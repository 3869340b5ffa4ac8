#[path = "../common/mod.rs"]
mod common;

mod actions;
mod contention;
mod errors;
mod expunge;
mod modes;
