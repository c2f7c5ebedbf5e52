//! Roofing inspection reports: capture, validation, signing, PDF output,
//! offline mobile sync and LBP complaint lodging.

pub mod app;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pdf;
pub mod photos;
pub mod server;
pub mod storage;
