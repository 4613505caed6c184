//! Batched command execution engine.
//!
//! Runs a base command over a large file-argument list without ever
//! exceeding the platform's argument-length limit:
//! - **Chunk planning**: [`chunk::partition`] splits the file list into
//!   argv-safe slices
//! - **Dispatch**: one subprocess per chunk, concurrent up to a worker bound
//! - **Merge**: exit codes collapse to their maximum, outputs concatenate in
//!   dispatch order
//!
//! # Execution Flow
//!
//! 1. [`BatchExecutor::run`] plans chunks from the file list
//! 2. Each chunk spawns `command... <chunk files>` with captured output
//! 3. Results land in slots indexed by dispatch order
//! 4. Slots merge into a single [`BatchResult`](runner::BatchResult)

pub mod chunk;
pub mod runner;

pub use runner::BatchExecutor;
