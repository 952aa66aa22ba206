// src/report/mod.rs

//! End-of-run reporting.
//!
//! - [`builder`] turns the original node list and the failure map into a
//!   3-column report (power / load / image).
//! - [`mail`] renders that report as the summary mail.

pub mod builder;
pub mod mail;

pub use builder::{Cell, Report, ReportRow, cells_for};
pub use mail::MailMessage;
