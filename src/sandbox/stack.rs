//! Dedicated stack for sandbox work.
//!
//! Parsing, lowering, evaluation and rendering all recurse. Their depth
//! limits are sized for this stack, not for whatever thread the host happens
//! to call from.

use std::io;
use std::panic;
use std::thread;

/// Stack reserved for each sandbox thread. Pages are only committed as the
/// recursion actually reaches them.
pub const SANDBOX_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Runs `f` on a scoped thread with [`SANDBOX_STACK_SIZE`] of stack and
/// waits for it. The caller's tracing span carries over; a panic in `f`
/// resumes on the caller.
pub fn with_sandbox_stack<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    let span = tracing::Span::current();
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("sandbox".to_string())
            .stack_size(SANDBOX_STACK_SIZE)
            .spawn_scoped(scope, move || span.in_scope(f))?;
        match handle.join() {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

/// Rayon pool whose workers get the sandbox stack.
pub fn sandbox_pool() -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .stack_size(SANDBOX_STACK_SIZE)
        .thread_name(|i| format!("sandbox-worker-{}", i))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(n: u32) -> u32 {
        let pad = std::hint::black_box([0u8; 1024]);
        if n == 0 {
            u32::from(pad[0])
        } else {
            depth(n - 1) + 1 + u32::from(pad[n as usize % 1024])
        }
    }

    #[test]
    fn test_runs_on_named_thread_with_deep_stack() {
        let (name, reached) = with_sandbox_stack(|| {
            let name = thread::current().name().map(str::to_string);
            (name, depth(20_000))
        })
        .unwrap();
        assert_eq!(name.as_deref(), Some("sandbox"));
        assert_eq!(reached, 20_000);
    }

    #[test]
    fn test_borrows_from_caller() {
        let words = vec!["a", "b"];
        let joined = with_sandbox_stack(|| words.join("+")).unwrap();
        assert_eq!(joined, "a+b");
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_panics_resume_on_caller() {
        let _ = with_sandbox_stack(|| panic!("boom"));
    }
}
