//! Handler contract and consumption outcomes.

pub mod handler;
