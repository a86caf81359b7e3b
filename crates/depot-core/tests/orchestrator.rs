mod common;

use std::sync::{Arc, Mutex};

use depot_core::{
    CdnBackend, Error, JobContext, JobRunner, MemoryRegistry, Orchestrator, Registry, Target,
};

/// Runner double: the core target fails, every other target records a
/// registry write so isolation is observable.
struct StubRunner;

impl JobRunner for StubRunner {
    fn run(&self, target: Target, ctx: &JobContext<'_>) -> depot_core::Result<()> {
        if target == Target::Core {
            return Err(Error::Parse {
                item: "core".to_string(),
                reason: "generator blew up".to_string(),
            });
        }
        ctx.registry.set_field(target.name(), "generated", "yes")
    }
}

struct RecordingCdn {
    name: &'static str,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl CdnBackend for RecordingCdn {
    fn name(&self) -> &'static str {
        self.name
    }

    fn purge(&self, urls: &[String]) -> depot_core::Result<()> {
        self.calls.lock().unwrap().push(urls.to_vec());
        Ok(())
    }
}

#[test]
fn failing_job_never_affects_its_siblings() {
    let temp = tempfile::tempdir().unwrap();
    let settings = common::test_settings(temp.path());
    let registry = MemoryRegistry::new();
    let cache = common::cache(temp.path());
    let fetcher = common::fetcher(temp.path());
    let ctx = JobContext {
        settings: &settings,
        registry: &registry,
        cache: &cache,
        fetcher: &fetcher,
    };

    let backends: Vec<Box<dyn CdnBackend>> = Vec::new();
    let orchestrator = Orchestrator::with_runner(ctx, &backends, &StubRunner);
    let jobs: Vec<String> = ["core", "asset", "pluginmaster"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let report = orchestrator.run_cycle(&jobs);

    assert_eq!(report.jobs.len(), 3);
    let by_name = |name: &str| report.jobs.iter().find(|job| job.name == name).unwrap();
    assert!(!by_name("core").ok);
    assert!(by_name("core").error.as_deref().unwrap().contains("generator blew up"));
    assert!(by_name("asset").ok);
    assert!(by_name("pluginmaster").ok);

    // Sibling writes landed despite the failure.
    assert_eq!(
        registry.get_field("asset", "generated").unwrap().as_deref(),
        Some("yes")
    );
    assert_eq!(
        registry
            .get_field("pluginmaster", "generated")
            .unwrap()
            .as_deref(),
        Some("yes")
    );
    assert!(registry.get_field("core", "generated").unwrap().is_none());
    assert!(!report.all_ok());
}

#[test]
fn unknown_job_fails_alone_with_invalid_job_error() {
    let temp = tempfile::tempdir().unwrap();
    let settings = common::test_settings(temp.path());
    let registry = MemoryRegistry::new();
    let cache = common::cache(temp.path());
    let fetcher = common::fetcher(temp.path());
    let ctx = JobContext {
        settings: &settings,
        registry: &registry,
        cache: &cache,
        fetcher: &fetcher,
    };

    let backends: Vec<Box<dyn CdnBackend>> = Vec::new();
    let orchestrator = Orchestrator::with_runner(ctx, &backends, &StubRunner);
    let jobs: Vec<String> = ["pluginmaster", "asset", "bogus"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let report = orchestrator.run_cycle(&jobs);

    let by_name = |name: &str| report.jobs.iter().find(|job| job.name == name).unwrap();
    assert!(by_name("pluginmaster").ok);
    assert!(by_name("asset").ok);
    assert!(!by_name("bogus").ok);
    assert!(by_name("bogus").error.as_deref().unwrap().contains("invalid job"));
}

#[test]
fn purge_phase_fans_out_jobs_times_backends() {
    let temp = tempfile::tempdir().unwrap();
    let settings = common::test_settings(temp.path());
    let registry = MemoryRegistry::new();
    let cache = common::cache(temp.path());
    let fetcher = common::fetcher(temp.path());
    let ctx = JobContext {
        settings: &settings,
        registry: &registry,
        cache: &cache,
        fetcher: &fetcher,
    };

    let edge_calls = Arc::new(Mutex::new(Vec::new()));
    let mirror_calls = Arc::new(Mutex::new(Vec::new()));
    let backends: Vec<Box<dyn CdnBackend>> = vec![
        Box::new(RecordingCdn {
            name: "edge",
            calls: edge_calls.clone(),
        }),
        Box::new(RecordingCdn {
            name: "mirror",
            calls: mirror_calls.clone(),
        }),
    ];

    let orchestrator = Orchestrator::with_runner(ctx, &backends, &StubRunner);
    let jobs: Vec<String> = ["pluginmaster", "launcher", "bogus"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let report = orchestrator.run_cycle(&jobs);

    // 3 jobs × 2 backends, every pair attempted independently.
    assert_eq!(report.purges.len(), 6);
    let ok_count = report.purges.iter().filter(|purge| purge.ok).count();
    assert_eq!(ok_count, 4);
    for purge in &report.purges {
        assert_eq!(purge.ok, purge.job != "bogus");
    }

    // The unknown job never reaches a backend; the known ones reach both.
    assert_eq!(edge_calls.lock().unwrap().len(), 2);
    assert_eq!(mirror_calls.lock().unwrap().len(), 2);

    let edge = edge_calls.lock().unwrap();
    assert!(edge.contains(&vec![
        "https://dist.example.com/Plugin/PluginMaster".to_string()
    ]));
    assert!(edge.contains(&vec!["https://dist.example.com/Proxy/Meta".to_string()]));
}
