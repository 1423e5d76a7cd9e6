//! Upstream wire shapes: conversational exchange (`/v3/chat*`), workflow
//! execution (`/v1/workflow/run*`) and the JWT-bearer OAuth token endpoint.

pub mod chat;
pub mod oauth;
pub mod types;
pub mod workflow;
