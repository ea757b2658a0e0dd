//! The render document and the protocol used to drive it.

pub mod controller;
pub mod template;
