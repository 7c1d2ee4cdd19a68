//! Persistence: embedding files, generator checkpoints and PNG I/O.

mod embedding;
mod image_io;
mod state;

pub use embedding::{load_embedding, save_embedding};
pub use image_io::{load_image, save_comparison, save_image};
pub use state::TensorState;
