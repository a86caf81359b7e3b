use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;

use crate::cdn::{self, CdnBackend};
use crate::error::{Error, Result};
use crate::targets::{self, JobContext, Target};

/// Executes one regeneration job. The seam exists so tests can substitute
/// generator execution; production uses [`PipelineRunner`].
pub trait JobRunner: Sync {
    fn run(&self, target: Target, ctx: &JobContext<'_>) -> Result<()>;
}

/// Default runner dispatching to the real target generators.
pub struct PipelineRunner;

impl JobRunner for PipelineRunner {
    fn run(&self, target: Target, ctx: &JobContext<'_>) -> Result<()> {
        targets::run(target, ctx)
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub name: String,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PurgeOutcome {
    pub job: String,
    pub backend: &'static str,
    pub ok: bool,
    pub error: Option<String>,
}

/// Per-unit results of one cycle. Partial success is the expected steady
/// state, not an exception.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub jobs: Vec<JobOutcome>,
    pub purges: Vec<PurgeOutcome>,
}

impl CycleReport {
    pub fn all_ok(&self) -> bool {
        self.jobs.iter().all(|job| job.ok) && self.purges.iter().all(|purge| purge.ok)
    }
}

/// Dispatches regeneration jobs and CDN purges in two barrier-separated
/// concurrent phases.
pub struct Orchestrator<'a> {
    ctx: JobContext<'a>,
    backends: &'a [Box<dyn CdnBackend>],
    runner: &'a dyn JobRunner,
}

impl<'a> Orchestrator<'a> {
    pub fn new(ctx: JobContext<'a>, backends: &'a [Box<dyn CdnBackend>]) -> Self {
        Self {
            ctx,
            backends,
            runner: &PipelineRunner,
        }
    }

    pub fn with_runner(
        ctx: JobContext<'a>,
        backends: &'a [Box<dyn CdnBackend>],
        runner: &'a dyn JobRunner,
    ) -> Self {
        Self {
            ctx,
            backends,
            runner,
        }
    }

    /// One full cycle: run every named job concurrently, wait for all of
    /// them, then purge the cross product of names and backends. Failures
    /// never cross unit boundaries.
    pub fn run_cycle(&self, jobs: &[String]) -> CycleReport {
        tracing::info!(?jobs, "starting regeneration phase");
        let outcomes = fan_out(jobs.to_vec(), |name| self.regen_job(name));
        for outcome in &outcomes {
            match &outcome.error {
                None => tracing::info!(job = %outcome.name, "regeneration finished"),
                Some(error) => {
                    tracing::error!(job = %outcome.name, %error, "regeneration failed")
                }
            }
        }

        let pairs: Vec<(String, &dyn CdnBackend)> = jobs
            .iter()
            .flat_map(|job| {
                self.backends
                    .iter()
                    .map(move |backend| (job.clone(), backend.as_ref()))
            })
            .collect();
        tracing::info!(pairs = pairs.len(), "starting purge phase");
        let purges = fan_out(pairs, |(job, backend)| self.purge_job(job, backend));
        for outcome in &purges {
            match &outcome.error {
                None => tracing::info!(
                    job = %outcome.job,
                    backend = outcome.backend,
                    "purge finished"
                ),
                Some(error) => tracing::error!(
                    job = %outcome.job,
                    backend = outcome.backend,
                    %error,
                    "purge failed"
                ),
            }
        }

        CycleReport {
            jobs: outcomes,
            purges,
        }
    }

    fn regen_job(&self, name: String) -> JobOutcome {
        tracing::info!(job = %name, "starting regeneration job");
        let result = match Target::parse(&name) {
            Some(target) => self.runner.run(target, &self.ctx),
            None => Err(Error::UnknownJob(name.clone())),
        };
        match result {
            Ok(()) => JobOutcome {
                name,
                ok: true,
                error: None,
            },
            Err(err) => JobOutcome {
                name,
                ok: false,
                error: Some(err.to_string()),
            },
        }
    }

    fn purge_job(&self, job: String, backend: &dyn CdnBackend) -> PurgeOutcome {
        let backend_name = backend.name();
        let result = match Target::parse(&job) {
            Some(target) => {
                let urls =
                    cdn::absolute_urls(&self.ctx.settings.hosted_url, target.purge_paths());
                tracing::info!(job = %job, backend = backend_name, urls = urls.len(), "purging");
                backend.purge(&urls)
            }
            None => Err(Error::UnknownJob(job.clone())),
        };
        match result {
            Ok(()) => PurgeOutcome {
                job,
                backend: backend_name,
                ok: true,
                error: None,
            },
            Err(err) => PurgeOutcome {
                job,
                backend: backend_name,
                ok: false,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Run `run` over every item on a worker pool bounded by the machine's
/// available parallelism, preserving input order in the results.
fn fan_out<T, R, F>(items: Vec<T>, run: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(total);

    let (job_tx, job_rx) = mpsc::channel();
    for job in items.into_iter().enumerate() {
        let _ = job_tx.send(job);
    }
    drop(job_tx);
    let job_rx = Mutex::new(job_rx);

    let (result_tx, result_rx) = mpsc::channel();
    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    thread::scope(|s| {
        for _ in 0..workers {
            let result_tx = result_tx.clone();
            let job_rx = &job_rx;
            let run = &run;
            s.spawn(move || {
                loop {
                    let job = job_rx.lock().recv();
                    let Ok((idx, item)) = job else { break };
                    if result_tx.send((idx, run(item))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);
        for (idx, result) in result_rx {
            slots[idx] = Some(result);
        }
    });
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_preserves_order() {
        let results = fan_out((0..64).collect(), |n: i32| n * 2);
        assert_eq!(results, (0..64).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn fan_out_handles_empty_input() {
        let results = fan_out(Vec::<i32>::new(), |n| n);
        assert!(results.is_empty());
    }
}
