//! Post data model shared by every layer.

pub mod models;

#[cfg(test)]
mod mod_tests;
