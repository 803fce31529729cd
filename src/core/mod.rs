//! Retrieval core: storage interface, listing, selection, downloads

pub mod client;
pub mod config;
pub mod download;
pub mod filter;
pub mod listing;
pub mod local;
pub mod manifest;
pub mod memory;
pub mod reader;
pub mod reference;
pub mod retry;
pub mod validation;
