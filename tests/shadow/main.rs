#[path = "../common/mod.rs"]
mod common;

mod delete;
mod lookups;
mod maintenance;
mod unit_of_work;
