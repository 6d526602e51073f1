//! # Voxel Streaming Demo
//!
//! Headless entry point. Walks an observer across noise terrain and logs the pipeline.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --release -- [config.json]
//! ```

fn main() {
    voxel_streaming::run();
}
