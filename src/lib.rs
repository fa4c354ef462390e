//! patron-notify: WhatsApp receipts for new rows in a payments sheet.
//!
//! A poll loop reads the sheet, finds rows whose `Notification Sent` cell is
//! blank or `false`, sends each patron a receipt through a WhatsApp gateway,
//! and marks the row `true` once the send is accepted.
//!
//! # Architecture
//!
//! - **Sheet**: [`sheet::RecordSource`] reads snapshots and writes cells
//!   (Google Sheets REST, or an in-memory grid)
//! - **Schema**: [`schema::resolve`] maps header text to column positions
//!   and provisions the tracking column
//! - **Dispatch**: [`dispatch::Dispatcher`] runs one non-reentrant pass;
//!   [`dispatch::PollLoop`] repeats it on an interval
//! - **Transport**: [`transport::Transport`] sends messages; gateway
//!   callbacks arrive through [`transport::webhook`] as events
//! - **Observer**: [`observer::DeliveryObserver`] logs session and delivery
//!   state from the event stream

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod notification;
pub mod observer;
pub mod rate_limit;
pub mod schema;
pub mod service;
pub mod sheet;
pub mod transport;

pub use config::NotifyConfig;
pub use dispatch::{Dispatcher, IterationOutcome, IterationReport, PollLoop};
pub use error::{NotifyError, Result};
pub use service::NotifyService;
