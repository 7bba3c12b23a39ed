//! Bounded proof-of-work search.
//!
//! Shared by mesh block assembly (difficulty 2, single worker, constrained
//! hardware) and the dual-mode miner (multiple workers sized by the mode's
//! power budget). Every search is bounded by a timeout and can be cancelled
//! cooperatively through a [`CancellationToken`]; no search blocks forever.
//!
//! Difficulty counts leading ASCII `'0'` characters of the lowercase hex
//! digest, i.e. leading zero nibbles.

use crate::error::{CoreError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How many nonces a worker tries between deadline/cancellation checks.
const CHECK_INTERVAL: u64 = 256;

/// Hex digits in a SHA-256 digest; no hash meets a higher difficulty.
pub const MAX_DIFFICULTY: u32 = 64;

/// Returns true when `hash_hex` starts with `difficulty` `'0'` digits.
pub fn meets_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let needed = difficulty as usize;
    hash_hex.len() >= needed && hash_hex.as_bytes()[..needed].iter().all(|b| *b == b'0')
}

/// Parameters for a nonce search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Required number of leading zero hex digits
    pub difficulty: u32,
    /// Number of worker threads (at least one is always used)
    pub workers: usize,
    /// Wall-clock budget for the whole search
    pub timeout: Duration,
    /// First nonce tried by worker 0
    pub start_nonce: u64,
}

impl SearchParams {
    /// Single-worker search starting at nonce 0.
    pub fn single(difficulty: u32, timeout: Duration) -> Self {
        Self {
            difficulty,
            workers: 1,
            timeout,
            start_nonce: 0,
        }
    }
}

/// Result of a nonce search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowOutcome {
    /// A nonce satisfying the difficulty was found
    Found {
        nonce: u64,
        hash: String,
        attempts: u64,
    },
    /// The timeout elapsed first
    TimedOut { attempts: u64 },
    /// The cancellation token fired first
    Cancelled { attempts: u64 },
}

impl PowOutcome {
    /// Total hashes computed across all workers.
    pub fn attempts(&self) -> u64 {
        match self {
            PowOutcome::Found { attempts, .. }
            | PowOutcome::TimedOut { attempts }
            | PowOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

/// Search for a nonce whose `hash_fn(nonce)` meets `params.difficulty`.
///
/// Worker `i` of `n` tries nonces `start + i, start + i + n, ...`, so a
/// single-worker search walks nonces in order. The first worker to succeed
/// stops the others.
///
/// # Errors
/// Propagates the first error returned by `hash_fn`.
pub fn search_nonce<F>(
    params: &SearchParams,
    cancel: &CancellationToken,
    hash_fn: F,
) -> Result<PowOutcome>
where
    F: Fn(u64) -> Result<String> + Sync,
{
    let workers = params.workers.max(1);
    let stride = workers as u64;
    let deadline = Instant::now() + params.timeout;
    let stop = AtomicBool::new(false);
    let attempts = AtomicU64::new(0);
    let result: Mutex<Option<Result<(u64, String)>>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for worker in 0..workers {
            let stop = &stop;
            let attempts = &attempts;
            let result = &result;
            let hash_fn = &hash_fn;
            scope.spawn(move || {
                let mut nonce = params.start_nonce.wrapping_add(worker as u64);
                let mut local: u64 = 0;
                loop {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    if local % CHECK_INTERVAL == 0
                        && (cancel.is_cancelled() || Instant::now() >= deadline)
                    {
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }

                    let outcome = hash_fn(nonce);
                    local += 1;
                    let hit = match outcome {
                        Ok(hash) if meets_difficulty(&hash, params.difficulty) => {
                            Some(Ok((nonce, hash)))
                        }
                        Ok(_) => None,
                        Err(e) => Some(Err(e)),
                    };
                    if let Some(hit) = hit {
                        if let Ok(mut slot) = result.lock() {
                            if slot.is_none() {
                                *slot = Some(hit);
                            }
                        }
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }
                    nonce = nonce.wrapping_add(stride);
                }
                attempts.fetch_add(local, Ordering::Relaxed);
            });
        }
    });

    let attempts = attempts.load(Ordering::Relaxed);
    let slot = result
        .into_inner()
        .map_err(|e| CoreError::StatePoisoned(format!("PoW result lock: {}", e)))?;

    let outcome = match slot {
        Some(Ok((nonce, hash))) => PowOutcome::Found {
            nonce,
            hash,
            attempts,
        },
        Some(Err(e)) => return Err(e),
        None if cancel.is_cancelled() => PowOutcome::Cancelled { attempts },
        None => PowOutcome::TimedOut { attempts },
    };

    debug!(
        difficulty = params.difficulty,
        workers,
        attempts,
        found = matches!(outcome, PowOutcome::Found { .. }),
        "Nonce search finished"
    );

    Ok(outcome)
}
