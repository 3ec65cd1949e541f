//! SIGA → MegaZap boleto notifier.
//!
//! Pages through the SIGA roster API, collects each active student's
//! boletos due in the next few days and sends one MegaZap notification per
//! boleto.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `diagnostics`: Redacted description of the SIGA student-list request.
//! - `errors`: Error handling types.
//! - `integration`: The end-to-end run.
//! - `megazap_client`: MegaZap API client.
//! - `models`: Student and boleto models, SIGA field extraction.
//! - `payload`: MegaZap payload construction.
//! - `siga_client`: SIGA API client and student pagination.

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod integration;
pub mod megazap_client;
pub mod models;
pub mod payload;
pub mod siga_client;
