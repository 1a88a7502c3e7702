//! Daily email digest: fetch the last day of mail over IMAP, have a local
//! model summarize and rank it, flag legal issues, and mail the report.

pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod flagger;
pub mod inference;
pub mod logging;
pub mod mail;
pub mod monitor;
pub mod pipeline;
pub mod report;
pub mod retry;
