//! Argument-length-bounded partitioning.
//!
//! Pure planning logic, kept separate from process spawning so it can be
//! tested without running anything.

use crate::error::{BatchError, Result};

/// Headroom reserved for environment growth and exec bookkeeping beyond the
/// raw environment block.
const ENV_RESERVE: usize = 2048;

/// Bounds applied to the queried platform limit. Kernels report wildly
/// different `ARG_MAX` values; anything above 128 KiB buys nothing, and
/// anything below 4 KiB is treated as a reporting artifact.
const MIN_MAX_LENGTH: usize = 1 << 12;
const MAX_MAX_LENGTH: usize = 1 << 17;

/// Size of the current environment block as the kernel counts it: each
/// `KEY=VALUE` entry plus its terminating NUL.
#[cfg(unix)]
fn environ_size() -> usize {
    std::env::vars_os().map(|(k, v)| k.len() + v.len() + 2).sum()
}

/// Maximum byte length available for a single argument vector, after
/// accounting for the environment block the child inherits.
#[cfg(unix)]
pub fn platform_max_length() -> usize {
    // SAFETY: sysconf takes no pointers; a negative result means the limit
    // is unsupported on this kernel.
    let arg_max = unsafe { libc::sysconf(libc::_SC_ARG_MAX) };
    if arg_max < 0 {
        return MIN_MAX_LENGTH;
    }
    (arg_max as usize)
        .saturating_sub(ENV_RESERVE + environ_size())
        .clamp(MIN_MAX_LENGTH, MAX_MAX_LENGTH)
}

#[cfg(windows)]
pub fn platform_max_length() -> usize {
    // CreateProcess caps the command line at 2^15 - 1 UTF-16 units.
    (1 << 15) - ENV_RESERVE
}

#[cfg(not(any(unix, windows)))]
pub fn platform_max_length() -> usize {
    MIN_MAX_LENGTH
}

/// Argv bytes consumed by the command tokens themselves: each token plus its
/// terminating NUL, plus the trailing NULL pointer slot.
fn fixed_cost(command: &[String]) -> usize {
    command.iter().map(|t| t.len() + 1).sum::<usize>() + 1
}

/// Split `files` into contiguous chunks such that every chunk, appended to
/// `command`, stays within `max_length` bytes of argv.
///
/// Accumulation is greedy: a chunk closes when the next file would push it
/// over the limit. Concatenating the returned slices reproduces `files`
/// exactly; an empty file list yields one empty chunk, so the command still
/// runs once. A single file that cannot fit even in an otherwise-empty chunk
/// is rejected rather than planned over the limit.
pub fn partition<'a>(
    command: &[String],
    files: &'a [String],
    max_length: usize,
) -> Result<Vec<&'a [String]>> {
    let fixed = fixed_cost(command);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut budget = fixed;

    for (idx, file) in files.iter().enumerate() {
        let cost = file.len() + 1;
        if fixed + cost > max_length {
            return Err(BatchError::ArgumentTooLong(file.clone()));
        }
        if budget + cost > max_length {
            chunks.push(&files[start..idx]);
            start = idx;
            budget = fixed;
        }
        budget += cost;
    }
    chunks.push(&files[start..]);

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn concatenation_reproduces_input_in_order() {
        let command = strings(&["tool", "--flag"]);
        let files = strings(&["aaaa", "bbbb", "cccc", "dddd", "eeee"]);

        let chunks = partition(&command, &files, 25).unwrap();

        assert!(chunks.len() > 1);
        let flattened: Vec<String> = chunks.iter().flat_map(|c| c.to_vec()).collect();
        assert_eq!(flattened, files);
    }

    #[test]
    fn every_chunk_fits_the_limit() {
        let command = strings(&["tool"]);
        let files: Vec<String> = (0..200).map(|i| format!("file-{i:03}")).collect();
        let max_length = 64;

        let chunks = partition(&command, &files, max_length).unwrap();

        let fixed = fixed_cost(&command);
        for chunk in &chunks {
            let used: usize = chunk.iter().map(|f| f.len() + 1).sum();
            assert!(fixed + used <= max_length);
        }
    }

    #[test]
    fn empty_file_list_yields_one_empty_chunk() {
        let command = strings(&["tool"]);
        let chunks = partition(&command, &[], 4096).unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn exact_fit_stays_in_one_chunk() {
        let command = strings(&["abc"]);
        // fixed = 3 + 1 + 1 = 5; two files of cost 4 each fill 13 exactly.
        let files = strings(&["xyz", "uvw"]);

        let chunks = partition(&command, &files, 13).unwrap();
        assert_eq!(chunks.len(), 1);

        let chunks = partition(&command, &files, 12).unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn oversized_single_argument_is_rejected() {
        let command = strings(&["tool"]);
        let files = strings(&["short", &"x".repeat(100)]);

        let err = partition(&command, &files, 50).unwrap_err();
        assert!(matches!(err, BatchError::ArgumentTooLong(arg) if arg.len() == 100));
    }

    #[test]
    fn single_file_per_chunk_under_tight_limit() {
        let command = strings(&["t"]);
        let files = strings(&["aaaa", "bbbb", "cccc"]);
        // fixed = 3; each file costs 5; limit 8 admits exactly one per chunk.
        let chunks = partition(&command, &files, 8).unwrap();

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn platform_limit_is_clamped() {
        let limit = platform_max_length();
        assert!(limit >= MIN_MAX_LENGTH);
        assert!(limit <= MAX_MAX_LENGTH);
    }
}
