#![forbid(unsafe_code)]

pub mod catalog;
pub mod cli;
pub mod config;
pub mod download;
pub mod formats;
pub mod ledger;
pub mod links;
pub mod logging;
