//! HTTP upload of finished reports.

pub mod client;

pub use client::UploadClient;
