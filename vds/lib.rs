#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod blocks;
pub mod config;
pub mod densify;
pub mod invariants;
pub mod io;
pub mod progress;
pub mod reconcile;
pub mod types;
pub mod validate;
pub mod variants;
