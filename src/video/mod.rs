mod coordinator;
mod job;
mod media;
#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{RenderCoordinator, RenderError, SceneUpdate};
pub use job::{RenderJobState, RenderPhase};
pub use media::{MediaHandle, MediaStore};
