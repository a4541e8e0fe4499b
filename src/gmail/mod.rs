//! Gmail resource clients: profile, labels, and message operations over the
//! v1 REST API.

mod client;
pub mod message;

pub use client::GmailClient;
pub use message::{Message, MessageRef, Profile};
