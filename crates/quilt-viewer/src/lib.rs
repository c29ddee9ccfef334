//! Quilt viewer: drives a lenticular light-field display with wgpu.
//!
//! A demo scene is rendered into a multi-view quilt by the `lenticular`
//! passes and interleaved onto the panel. [`renderer::WgpuBackend`] is the
//! GPU side of those passes.

pub mod app;
pub mod config;
pub mod data;
pub mod renderer;
pub mod scene;
