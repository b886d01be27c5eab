//! Teller Assistant Library Crate
//!
//! This library contains the terminal front end for the teller-core
//! conversation engine: configuration loading, challenge-bank assembly, and
//! the interactive chat loop. The `assistant` binary is a thin wrapper
//! around this library.

pub mod chat;
pub mod config;
