// redline-server: collaborative notebook service with owner-reviewed
// edit proposals.

pub mod activity;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod reconcile;
pub mod registry;
pub mod store;
