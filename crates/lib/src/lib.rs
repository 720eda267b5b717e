//! tasklink core library: Slack interaction webhook verification, the modal/page flow,
//! and retrying delivery to the Slack and Notion APIs. Used by the `tasklink` CLI.

pub mod config;
pub mod context;
pub mod interaction;
pub mod remote;
pub mod retry;
pub mod server;
pub mod signature;
pub mod transport;

#[cfg(test)]
mod test_support;
