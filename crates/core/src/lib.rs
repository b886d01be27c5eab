pub mod auth;
pub mod challenge;
pub mod classifier;
pub mod session;
