//! flowgate CLI binary
//!
//! All logic is in the library; main.rs only invokes cli::run().

fn main() {
    // cli::run() reports its own errors; only the exit code comes back
    if let Err(code) = flowgate::cli::run() {
        std::process::exit(code.as_i32());
    }
}
