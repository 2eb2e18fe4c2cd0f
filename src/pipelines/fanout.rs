//! Bounded parallel processing of collection members.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use log::{error, info};
use tokio::sync::Semaphore;

use crate::config::defs::{MemberFailure, PipelineError, RunConfig};
use crate::config::params::TopHatParams;
use crate::pipelines::input::{CollectionMember, resolve_library};
use crate::pipelines::single::{AlignmentResult, process_library};

/// Runs `process` once per member with at most `workers` in flight.
///
/// Results come back in member order regardless of completion order. Every
/// member runs to completion; if any failed, the whole batch fails with one
/// error listing each failed member.
///
/// # Arguments
///
/// * `members` - ordered collection members
/// * `workers` - concurrency bound, treated as at least 1
/// * `process` - builds the work for `(index, member)`
pub async fn fan_out<T, F, Fut>(
    members: Vec<CollectionMember>,
    workers: usize,
    process: F,
) -> Result<Vec<T>, PipelineError>
where
    T: Send + 'static,
    F: Fn(usize, CollectionMember) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>> + Send + 'static,
{
    let total = members.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    info!("Processing {} member(s) with {} worker(s)", total, workers.max(1));

    let mut handles = Vec::with_capacity(total);
    let mut refs = Vec::with_capacity(total);
    for (index, member) in members.into_iter().enumerate() {
        refs.push(member.library_ref.clone());
        let work = process(index, member);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::WorkerAborted(e.to_string()))?;
            work.await
        }));
    }

    let mut results = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for ((index, outcome), library_ref) in join_all(handles).await.into_iter().enumerate().zip(refs) {
        let outcome = match outcome {
            Ok(result) => result,
            Err(join_err) => Err(PipelineError::WorkerAborted(join_err.to_string())),
        };
        match outcome {
            Ok(value) => results.push(value),
            Err(e) => {
                error!("member {} ({}) failed: {}", index + 1, library_ref, e);
                failures.push(MemberFailure { index, library_ref, error: e });
            }
        }
    }

    if failures.is_empty() {
        Ok(results)
    } else {
        Err(PipelineError::MemberPipelineFailed { total, failures })
    }
}

/// Aligns every member of a collection, each under its own condition label.
pub async fn run_collection(
    config: Arc<RunConfig>,
    members: Vec<CollectionMember>,
    workers: usize,
    index_base: PathBuf,
    result_dir: PathBuf,
    params: &TopHatParams,
) -> Result<Vec<AlignmentResult>, PipelineError> {
    fan_out(members, workers, |_, member| {
        let config = Arc::clone(&config);
        let index_base = index_base.clone();
        let result_dir = result_dir.clone();
        let CollectionMember { library_ref, condition } = member;
        let mut member_params = params.clone();
        member_params.reads_condition = Some(condition);
        async move {
            let library = resolve_library(&config.services, &library_ref).await?;
            process_library(&config, &library, &index_base, &result_dir, &member_params).await
        }
    })
    .await
}
