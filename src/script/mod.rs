pub mod chat;
pub mod model;
pub mod preset;
pub mod selector;
pub mod source;
