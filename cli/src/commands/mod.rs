pub mod ask;
pub mod chat;
pub mod classify;
pub mod remote;
