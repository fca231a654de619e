//! Application services: the queue engine and the consumer built on it.

pub mod consumer;
pub mod engine;
