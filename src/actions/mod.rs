// src/actions/mod.rs
pub mod affinity;
pub mod exec;
