use anyhow::Context;
use clap::Parser;

use depot_core::{
    ArtifactCache, JobContext, Orchestrator, RedisRegistry, Settings, SourceFetcher, Target, cdn,
};

#[derive(Debug, Parser)]
#[command(
    name = "depot",
    about = "Regenerate distribution manifests and purge CDN caches"
)]
struct Cli {
    /// Job names to regenerate; defaults to every known job
    jobs: Vec<String>,

    /// Logging filter, e.g. `info` or `depot_core=debug`
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log)),
        )
        .init();

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "regeneration cycle failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("failed to load settings")?;
    let registry = RedisRegistry::connect(&settings.redis_url, &settings.redis_prefix)
        .context("failed to open registry connection")?;
    let cache = ArtifactCache::new(settings.cache_dir.clone())
        .context("failed to prepare artifact cache")?;
    let fetcher = SourceFetcher::new(settings.repo_dir.clone(), settings.github_token.clone())
        .context("failed to prepare source fetcher")?;
    let backends = cdn::build_backends(&settings).context("failed to build CDN backends")?;

    let jobs: Vec<String> = if cli.jobs.is_empty() {
        Target::ALL.iter().map(|t| t.name().to_string()).collect()
    } else {
        cli.jobs
    };

    let ctx = JobContext {
        settings: &settings,
        registry: &registry,
        cache: &cache,
        fetcher: &fetcher,
    };
    let report = Orchestrator::new(ctx, &backends).run_cycle(&jobs);

    for job in &report.jobs {
        tracing::info!(job = %job.name, ok = job.ok, "regen result");
    }
    for purge in &report.purges {
        tracing::info!(job = %purge.job, backend = purge.backend, ok = purge.ok, "purge result");
    }

    if !report.all_ok() {
        anyhow::bail!("one or more units failed; see log for details");
    }
    Ok(())
}
