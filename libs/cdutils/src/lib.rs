//! Utility functions shared by the disc access crates
pub mod io;
pub mod msf;
