//! awsgate
//!
//! Provisions the AWS CLI on demand: fetches a prebuilt bundle, extracts
//! it with path-traversal and size-limit defenses, and resolves the bundled
//! dynamic loader, then executes chat-supplied command lines against it
//! under a restricted, explicitly constructed environment.

pub mod authz;
pub mod config;
pub mod environment;
pub mod executor;
pub mod extract;
pub mod provision;
pub mod render;
pub mod runner;
