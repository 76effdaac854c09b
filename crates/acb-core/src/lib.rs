//! Core of the chat accounting bot: ledgers, reports, exports and the
//! handlers that drive them.
//!
//! This crate knows nothing about Telegram. The adapter crate implements
//! [`messaging::port::MessagingPort`] and feeds updates into [`bot::AccountingBot`].

pub mod actions;
pub mod bot;
pub mod calc;
pub mod command;
pub mod config;
pub mod domain;
pub mod errors;
pub mod export;
pub mod formatting;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod report;
pub mod scheduler;
pub mod security;
pub mod store;

pub use errors::{Error, Result};
