//! Command dispatch: deciding whether input runs locally or rides the bus.
//!
//! - **registry**: Known local commands and the handler trait
//! - **dispatcher**: Line parsing and the local-vs-forward decision

pub mod dispatcher;
pub mod registry;
