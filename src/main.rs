//! Invertir CLI
//!
//! # Usage
//!
//! ```bash
//! # Embed every image in a directory
//! invertir embed images/ --batch-size 4 --save-images
//!
//! # Explore a recovered embedding
//! invertir resample face_01 --count 8 --scale 0.15
//! invertir mix face_01 face_02
//! invertir style-transfer face_01 face_02 --random-noise
//! ```

use clap::Parser;
use invertir::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
