//! # Runtime
//!
//! Process bootstrap and the controller watch loop.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
