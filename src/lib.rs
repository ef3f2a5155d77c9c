//! Idea to storyboard to rendered clips.
//!
//! A [`ScriptService`](api::ScriptService) turns a free-text idea into a
//! [`Script`](scene::Script); the [`App`](app::App) gate admits it and hands
//! it to a [`RenderCoordinator`](video::RenderCoordinator), which renders
//! every scene as an independent long-running video operation.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod scene;
pub mod video;

pub use error::{Result, VideoError};
