#![allow(dead_code)]

use std::path::Path;

use depot_core::{ArtifactCache, RemoteRepo, Settings, SourceFetcher};

pub fn test_settings(root: &Path) -> Settings {
    Settings {
        hosted_url: "https://dist.example.com".parse().unwrap(),
        cache_dir: root.join("cache"),
        repo_dir: root.join("repo"),
        redis_url: "redis://127.0.0.1/".to_string(),
        redis_prefix: "depot-test|".to_string(),
        github_token: None,
        plugin_repo: repo("https://github.com/acme/PluginDistro.git"),
        distrib_repo: repo("https://github.com/acme/Distrib.git"),
        asset_repo: repo("https://github.com/acme/Assets.git"),
        core_repo: repo("https://github.com/acme/Core.git"),
        launcher_repo: repo("https://github.com/acme/Launcher.git"),
        injector_repo: repo("https://github.com/acme/Injector.git"),
        updater_repo: repo("https://github.com/acme/Updater.git"),
        dist_format: "zip".to_string(),
        runtime_base_url: "https://runtime.example.com/dotnet".to_string(),
        cdn_list: Vec::new(),
        cloudflare: None,
        ctcdn: None,
        ottercloud: None,
    }
}

pub fn repo(url: &str) -> RemoteRepo {
    RemoteRepo::parse(url).unwrap()
}

pub fn cache(root: &Path) -> ArtifactCache {
    ArtifactCache::new(root.join("cache")).unwrap()
}

pub fn fetcher(root: &Path) -> SourceFetcher {
    SourceFetcher::new(root.join("repo"), None).unwrap()
}
