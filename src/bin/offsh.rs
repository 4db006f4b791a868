use std::env;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "server")]
use offline_shell::server;
use offline_shell::{
    AppConfig, CacheStorage, ClientRegistry, HttpTransport, Lifecycle, Partitions, storage,
};

fn print_usage() {
    eprintln!("Usage: offsh [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Pre-populate the Shell partition for the configured version");
    eprintln!("  activate            Delete partitions of other versions (a running server");
    eprintln!("                      switches versions on SIGHUP instead)");
    eprintln!("  status              List partitions and whether they are current or stale");
    eprintln!("  serve               Install, activate, then serve requests (requires 'server');");
    eprintln!("                      SIGHUP re-reads the config file and switches versions");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <PATH>     Config file (default: {})", AppConfig::default_path().display());
    eprintln!("  --version-tag <V>   Override the deployment version (not re-applied on SIGHUP)");
    eprintln!("  --origin <URL>      Override the application origin");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Set RUST_LOG=debug for per-request logging.");
}

#[derive(Clone)]
struct Args {
    command: Option<String>,
    config: Option<PathBuf>,
    version: Option<String>,
    origin: Option<String>,
}

fn flag_value(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    if let Some(value) = args.get(*i) {
        value.clone()
    } else {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut parsed = Args {
        command: None,
        config: None,
        version: None,
        origin: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--config" => parsed.config = Some(PathBuf::from(flag_value(&args, &mut i, "--config"))),
            "--version-tag" => parsed.version = Some(flag_value(&args, &mut i, "--version-tag")),
            "--origin" => parsed.origin = Some(flag_value(&args, &mut i, "--origin")),
            other if other.starts_with('-') => {
                eprintln!("Error: unknown option {other}");
                std::process::exit(1);
            }
            other => {
                if parsed.command.is_some() {
                    eprintln!("Error: unexpected argument {other}");
                    std::process::exit(1);
                }
                parsed.command = Some(other.to_string());
            }
        }
        i += 1;
    }
    parsed
}

fn load_config(args: &Args) -> offline_shell::Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(ref version) = args.version {
        config.layer.version.clone_from(version);
    }
    if let Some(ref origin) = args.origin {
        config.layer.origin.clone_from(origin);
    }
    config.layer.validate()?;
    Ok(config)
}

fn build_lifecycle(
    config: &AppConfig,
    store: Arc<dyn CacheStorage>,
    clients: Arc<ClientRegistry>,
) -> offline_shell::Result<(Lifecycle, Arc<HttpTransport>)> {
    let transport = Arc::new(HttpTransport::new(config.layer.timeouts())?);
    let lifecycle = Lifecycle::new(config.layer.clone(), store, transport.clone(), clients)?;
    Ok((lifecycle, transport))
}

async fn status(config: &AppConfig, store: &dyn CacheStorage) -> offline_shell::Result<()> {
    let partitions = Partitions::for_version(&config.layer.version)?;
    let names = store.names().await?;
    println!("Version: {}", partitions.version());
    if names.is_empty() {
        println!("No partitions.");
    }
    for name in names {
        let state = if partitions.is_current(&name) {
            "current"
        } else if partitions.is_stale(&name) {
            "stale"
        } else {
            "unmanaged"
        };
        println!("  {name:<32} {state}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> offline_shell::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    let Some(command) = args.command.clone() else {
        print_usage();
        std::process::exit(1);
    };

    let config = load_config(&args)?;
    let store = storage::from_config(&config.storage);
    let clients = Arc::new(ClientRegistry::new());

    match command.as_str() {
        "install" => {
            let (mut lifecycle, _) = build_lifecycle(&config, store, clients)?;
            let report = lifecycle.install().await;
            println!(
                "Installed {}: {} cached, {} failed",
                lifecycle.version(),
                report.stored.len(),
                report.failed.len()
            );
            for url in &report.failed {
                println!("  failed: {url}");
            }
        }
        "activate" => {
            let (mut lifecycle, _) = build_lifecycle(&config, store, clients)?;
            let report = lifecycle.activate().await;
            println!(
                "Activated {}: {} stale partitions deleted, {} cleanup failures",
                lifecycle.version(),
                report.deleted.len(),
                report.cleanup_failures
            );
            for name in &report.deleted {
                println!("  deleted: {name}");
            }
        }
        "status" => status(&config, store.as_ref()).await?,
        "serve" => {
            #[cfg(feature = "server")]
            {
                let (mut lifecycle, transport) =
                    build_lifecycle(&config, Arc::clone(&store), Arc::clone(&clients))?;
                lifecycle.install().await;
                lifecycle.activate().await;
                let generation = server::ActiveGeneration::new(lifecycle.interceptor()?);

                let reload: server::Reload = {
                    let args = Args {
                        version: None,
                        ..args.clone()
                    };
                    let store = Arc::clone(&store);
                    let transport = Arc::clone(&transport);
                    let clients = Arc::clone(&clients);
                    Box::new(move || {
                        let config = load_config(&args)?;
                        Lifecycle::new(
                            config.layer,
                            Arc::clone(&store),
                            transport.clone(),
                            clients.clone(),
                        )
                    })
                };
                server::run(&config.server, generation, transport, clients, Some(reload))
                    .await?;
            }
            #[cfg(not(feature = "server"))]
            {
                let _ = (store, clients);
                eprintln!("Server support not compiled in");
                std::process::exit(1);
            }
        }
        other => {
            eprintln!("Error: unknown command {other}");
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
