//! Concurrency-bounded job runner
//!
//! Jobs are futures that have not been polled yet. At most `limit` of them are in
//! flight. On the first failure no further job is started, in-flight jobs settle, and
//! the first failure is returned. Every started job's outcome is observed.

use std::future::Future;

use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError<E> {
    #[error("job {index} failed: {error}")]
    JobFailed { index: usize, error: E },
}

impl<E> RunnerError<E> {
    /// Position of the failed job in the input order.
    pub fn index(&self) -> usize {
        match self {
            RunnerError::JobFailed { index, .. } => *index,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RunnerError::JobFailed { error, .. } => error,
        }
    }
}

/// Run `jobs` with at most `limit` in flight. Results come back in input order.
pub async fn run_bounded<I, F, T, E>(jobs: I, limit: usize) -> Result<Vec<T>, RunnerError<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    run_bounded_with_progress(jobs, limit, |_| async {}).await
}

/// Like [`run_bounded`], awaiting `on_success(completed)` after each successful job.
///
/// `completed` counts successes so far (1-based). Callbacks run one at a time, so
/// the counts they observe are strictly increasing.
pub async fn run_bounded_with_progress<I, F, T, E, P, PF>(
    jobs: I,
    limit: usize,
    mut on_success: P,
) -> Result<Vec<T>, RunnerError<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    P: FnMut(usize) -> PF,
    PF: Future<Output = ()>,
{
    let limit = limit.max(1);
    let mut pending = jobs.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut results: Vec<Option<T>> = Vec::new();
    let mut first_failure: Option<RunnerError<E>> = None;
    let mut completed = 0usize;

    loop {
        while first_failure.is_none() && in_flight.len() < limit {
            match pending.next() {
                Some((index, job)) => {
                    results.push(None);
                    in_flight.push(async move { (index, job.await) });
                }
                None => break,
            }
        }

        let Some((index, outcome)) = in_flight.next().await else {
            break;
        };
        match outcome {
            Ok(value) => {
                results[index] = Some(value);
                completed += 1;
                on_success(completed).await;
            }
            Err(error) => {
                if first_failure.is_none() {
                    tracing::warn!(job_index = index, "Bounded job failed, draining in-flight jobs");
                    first_failure = Some(RunnerError::JobFailed { index, error });
                } else {
                    tracing::debug!(job_index = index, "Additional job failure while draining");
                }
            }
        }
    }

    if let Some(failure) = first_failure {
        return Err(failure);
    }

    Ok(results.into_iter().flatten().collect())
}
