/// Haven Types: wire-level data model shared by the state core and the client.

pub mod api;
pub mod events;
pub mod models;
