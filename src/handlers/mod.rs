//! HTTP handlers for generated resources.

pub mod resource;
