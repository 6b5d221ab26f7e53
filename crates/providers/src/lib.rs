//! Reasoning backend implementations for scanpilot.
//!
//! All providers implement the `scanpilot_core::Provider` trait. The only
//! wire dialect spoken today is the OpenAI-compatible chat completion API.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
