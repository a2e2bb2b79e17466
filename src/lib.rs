//! Library exports for the storybook application
//!
//! This module exposes internal components for testing and potential library
//! usage.

pub mod blob;
pub mod database;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod handler;
pub mod image_gen;
pub mod middleware;
pub mod model;
pub mod route;
pub mod settings;
pub mod store;
pub mod sweeper;
pub mod text_gen;
