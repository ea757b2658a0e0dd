//! Offline rendering of the document: browser sessions, frame capture and the hand-off to the
//! encoder.

pub mod browser;
pub mod capture;
pub mod session;
