use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use git_interop::git::{FetchOptions, ForcePushMode, PushOptions};
use git_interop::logging::{parse_level, LogController};
use git_interop::parse::ConfigScope;
use git_interop::process::{find_git, AbortController, AbortSignal, PersistentContext};
use git_interop::repository::{Repository, RepositoryEvent};
use git_interop::settings::{JsonSettings, Settings};
use git_interop::watch::RepositoryWatch;
use log::LevelFilter;

const USAGE: &str = "Usage: git-interop [--repo=<path>] [--settings=<file>] [--log=<level>] <command> [args]

Commands:
  status                  Refresh and print the working tree status
  fetch [--prune]         Fetch from all remotes
  pull [--rebase]         Pull HEAD's upstream
  push [--force|--force-with-lease]
                          Push HEAD to its upstream
  sync [--rebase]         Pull then push
  stash [push|pop|apply|drop|list] [index|message]
  config <scope> [key]    Read one key, or list a scope
  watch                   Print repository events until interrupted";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Split leading --options from the command
    let mut repo = None;
    let mut settings_path = None;
    let mut level = LevelFilter::Info;
    let mut rest = args.as_slice();
    while let Some(arg) = rest.first() {
        if let Some(value) = arg.strip_prefix("--repo=") {
            repo = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--settings=") {
            settings_path = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--log=") {
            level = parse_level(value).ok_or_else(|| anyhow::anyhow!("Unknown log level: {}", value))?;
        } else {
            break;
        }
        rest = &rest[1..];
    }

    env_logger::Builder::new().filter_level(LevelFilter::Trace).init();
    let controller = LogController::new(level);

    let Some((command, command_args)) = rest.split_first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let settings = load_settings(settings_path)?;
    let persistent = PersistentContext {
        timeout: settings.timeout,
        ..Default::default()
    };
    let git = Arc::new(find_git(&settings.git_path_hints, persistent).await?);
    log::info!("Using git {} from {}", git.version(), git.path().display());

    let cwd = match repo {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let repository = Arc::new(
        Repository::open(git, &cwd, settings)
            .await
            .with_context(|| format!("{} is not inside a git repository", cwd.display()))?,
    );

    let flag = |name: &str| command_args.iter().any(|a| a == name);

    match command.as_str() {
        "status" => {
            repository.status().await?;
            print_status(&repository);
        }
        "fetch" => {
            let options = FetchOptions {
                all: true,
                prune: flag("--prune"),
                ..Default::default()
            };
            repository.fetch(options, Some(&interruptible())).await?;
        }
        "pull" => {
            repository.status().await?;
            repository
                .pull(flag("--rebase"), None, None, false, Some(&interruptible()))
                .await?;
        }
        "push" => {
            let force = if flag("--force-with-lease") {
                Some(ForcePushMode::ForceWithLease)
            } else if flag("--force") {
                Some(ForcePushMode::Force)
            } else {
                None
            };
            repository.status().await?;
            let options = PushOptions {
                force,
                ..Default::default()
            };
            repository.push(options, Some(&interruptible())).await?;
        }
        "sync" => {
            repository.status().await?;
            repository.sync(flag("--rebase"), Some(&interruptible())).await?;
        }
        "stash" => handle_stash(&repository, command_args).await?,
        "config" => handle_config(&repository, command_args).await?,
        "watch" => run_watch(&repository, &controller).await?,
        other => {
            return Err(anyhow::anyhow!("Unknown command: {}\n\n{}", other, USAGE));
        }
    }

    Ok(())
}

/// A signal that fires on Ctrl-C, so an interrupted transfer kills git and
/// still restores any auto-stash
fn interruptible() -> AbortSignal {
    let controller = AbortController::new();
    let signal = controller.signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted; cancelling");
            controller.abort();
        }
    });
    signal
}

fn load_settings(path: Option<PathBuf>) -> anyhow::Result<Settings> {
    let Some(path) = path.or_else(JsonSettings::default_path) else {
        return Ok(Settings::default());
    };
    let store = JsonSettings::load(&path).with_context(|| format!("Failed to load settings from {}", path.display()))?;
    Ok(Settings::from_store(&store))
}

fn print_status(repository: &Repository) {
    let model = repository.model();
    if let Some(head) = &model.head {
        match (&head.name, &head.upstream) {
            (Some(name), Some(up)) => println!(
                "On branch {} (tracking {}/{}; ahead {}, behind {})",
                name,
                up.remote,
                up.name,
                head.ahead.map_or("?".to_string(), |n| n.to_string()),
                head.behind.map_or("?".to_string(), |n| n.to_string()),
            ),
            (Some(name), None) => println!("On branch {}", name),
            (None, _) => println!("HEAD detached at {}", head.commit.as_deref().unwrap_or("?")),
        }
    }

    let groups = [
        ("Merge changes", &model.groups.merge),
        ("Staged changes", &model.groups.index),
        ("Changes", &model.groups.working_tree),
        ("Untracked", &model.groups.untracked),
    ];
    for (title, resources) in groups {
        if resources.is_empty() {
            continue;
        }
        println!("{}:", title);
        for resource in resources {
            let path = resource.path.strip_prefix(repository.root()).unwrap_or(&resource.path);
            match &resource.rename {
                Some(rename) => {
                    let rename = rename.strip_prefix(repository.root()).unwrap_or(rename);
                    println!("  {:?}: {} -> {}", resource.status, path.display(), rename.display());
                }
                None => println!("  {:?}: {}", resource.status, path.display()),
            }
        }
    }
    if model.did_hit_limit {
        println!("(too many changes; list truncated)");
    }
}

async fn handle_stash(repository: &Repository, args: &[String]) -> anyhow::Result<()> {
    let index = || args.get(1).map(|i| i.parse::<usize>()).transpose();
    match args.first().map(String::as_str) {
        None | Some("push") => {
            let message = args.get(1).map(String::as_str);
            repository.stash(message, true).await?;
        }
        Some("pop") => repository.stash_pop(index()?).await?,
        Some("apply") => repository.stash_apply(index()?).await?,
        Some("drop") => repository.stash_drop(index()?).await?,
        Some("list") => {
            for stash in repository.stash_list().await? {
                println!("stash@{{{}}}: {}", stash.index, stash.description);
            }
        }
        Some(other) => return Err(anyhow::anyhow!("Unknown stash command: {}", other)),
    }
    Ok(())
}

async fn handle_config(repository: &Repository, args: &[String]) -> anyhow::Result<()> {
    let scope: ConfigScope = args
        .first()
        .ok_or_else(|| anyhow::anyhow!("Usage: git-interop config <scope> [key]"))?
        .parse()?;

    match args.get(1) {
        Some(key) => {
            let value = repository.get_config(scope, key).await?;
            println!("{}\t{}", value.scope, value.value);
        }
        None => {
            for entry in repository.get_config_all(scope).await? {
                println!("{}\t{}={}", entry.scope, entry.key, entry.value.unwrap_or_default());
            }
        }
    }
    Ok(())
}

async fn run_watch(repository: &Arc<Repository>, controller: &LogController) -> anyhow::Result<()> {
    let watch = RepositoryWatch::attach(repository)?;
    let _file_log = watch.file_event_logger(controller);

    let root = repository.root().to_path_buf();
    let _events = repository.subscribe(move |event| match event {
        RepositoryEvent::DotGitChanged(path) => println!("git state changed: {}", path.display()),
        RepositoryEvent::DidChangeState => println!("status refreshed for {}", root.display()),
        RepositoryEvent::Disposed => println!("repository disposed"),
        RepositoryEvent::OperationStarted(_) | RepositoryEvent::OperationEnded(_) => {}
    });

    repository.status().await?;
    println!("Watching {} (Ctrl-C to stop)", repository.root().display());
    tokio::signal::ctrl_c().await?;
    Ok(())
}
