//! These models represent the objects passed around by the agent loop
//!
//! The transcript is the source of truth: everything the model said,
//! every tool it asked for and every result a tool produced lives in
//! `Message` values. Provider modules convert these internal structs to
//! and from the wire formats of the individual model APIs, so the loop
//! itself never touches provider JSON.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
