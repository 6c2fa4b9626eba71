//! API Routes
//!
//! Route handlers organized by functionality.

pub mod health;
pub mod leads;
pub mod stats;
pub mod status;
