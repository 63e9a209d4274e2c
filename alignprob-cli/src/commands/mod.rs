//! Command implementations for the alignprob CLI

pub mod classify;
pub mod inspect;
