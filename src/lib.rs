#![forbid(unsafe_code)]

//! Library half of the tubesheet tools: fetch a channel's uploads from the
//! YouTube Data API and reconcile them into a Google Sheets worksheet.

pub mod auth;
pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod sheets;
pub mod youtube;
