//! marketflow - content-marketing pipeline
//!
//! Turns a topic into a blog post, SEO metadata, visual descriptions, social
//! posts and finally a CMS document. Stages run in a fixed order over one
//! in-memory session; the CLI and the REST API both drive the same
//! [`pipeline::Pipeline`].

pub mod api;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod prompts;
pub mod rate_limit;
pub mod rest;
pub mod richtext;
pub mod session;
pub mod topics;
pub mod workflow;
