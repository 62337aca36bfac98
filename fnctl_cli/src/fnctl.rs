// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
use clap::Parser;
use fnctl_api::function::InvokeStyle;
use fnctl_core::client::{InitOptions, RemoveOutcome, Stages, StopOutcome};
use fnctl_core::deploy::DeployOutcome;
use std::path::PathBuf;

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Create a function project.
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        runtime: Option<String>,
        #[arg(long)]
        registry: Option<String>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        image: Option<String>,
        #[arg(long)]
        invoke: Option<InvokeStyle>,
    },
    /// Build the function image.
    Build {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Push the built image to its registry.
    Push {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Deploy the function, optionally building and pushing first.
    Deploy {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        build: bool,
        #[arg(long)]
        push: bool,
    },
    /// Run the function locally until interrupted.
    Run {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Release the marker of a local instance; the process (if any) is not terminated.
    Stop {
        port: u16,
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Send a message to the function.
    Invoke {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// local, remote or a URL; local first then remote if omitted.
        #[arg(long, default_value_t = String::from(""))]
        target: String,
        #[arg(long)]
        data: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
        #[arg(long)]
        format: Option<InvokeStyle>,
    },
    /// List deployed functions.
    List {
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Describe a function, by project path or by deployed name.
    Describe {
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Remove the deployed function, by project path or by deployed name.
    Remove {
        path: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, clap::Parser)]
#[command(long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
    #[arg(short, long, default_value_t = String::from("fnctl.toml"))]
    config_file: String,
    #[arg(short, long, default_value_t = String::from(""))]
    template: String,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Args::parse();
    let code = match dispatch(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            fnctl_cli::exit_code(&err)
        }
    };
    std::process::exit(code);
}

/// The current directory stands in for a missing path unless a name was given.
fn project_path(path: Option<PathBuf>, name: &Option<String>) -> Option<PathBuf> {
    match (path, name) {
        (Some(path), _) => Some(path),
        (None, Some(_)) => None,
        (None, None) => Some(PathBuf::from(".")),
    }
}

async fn dispatch(args: Args) -> anyhow::Result<i32> {
    if !args.template.is_empty() {
        fnctl_api::util::create_template(&args.template, fnctl_cli::fnctl_cli_default_conf().as_str())?;
        return Ok(fnctl_cli::EXIT_SUCCESS);
    }
    let command = match args.command {
        Some(command) => command,
        None => {
            log::debug!("Bye");
            return Ok(fnctl_cli::EXIT_SUCCESS);
        }
    };

    let settings = fnctl_cli::config::CliSettings::from_file(&args.config_file)?;
    let client = fnctl_cli::client_from_settings(&settings);

    match command {
        Commands::Init {
            path,
            name,
            runtime,
            registry,
            namespace,
            image,
            invoke,
        } => {
            let function = client.init(InitOptions {
                root: path,
                name,
                runtime,
                registry,
                namespace,
                image,
                invoke,
            })?;
            println!("initialized '{}' in {}", function.name, function.root.display());
        }
        Commands::Build { path } => {
            let function = client.build(&path).await?;
            if let Some(built) = &function.built {
                println!("{}@{}", built.reference, built.digest);
            }
        }
        Commands::Push { path } => {
            let function = client.push(&path).await?;
            if let Some(pushed) = &function.pushed {
                println!("{}@{}", pushed.reference, pushed.registry_digest);
            }
        }
        Commands::Deploy { path, build, push } => {
            let outcome = if build || push {
                client.apply(&path, Stages { build, push }).await?
            } else {
                client.deploy(&path).await?
            };
            match outcome {
                DeployOutcome::Deployed(function) => {
                    if let Some(deployed) = &function.deployed {
                        println!("{}", deployed.endpoint);
                    }
                }
                DeployOutcome::Pending { endpoint, detail, .. } => println!("pending {} ({})", endpoint, detail),
            }
        }
        Commands::Run { path, port } => {
            let mut job = client.run(&path, port).await?;
            println!("running '{}' on http://localhost:{}/", job.function().name, job.port());
            let mut code = fnctl_cli::EXIT_SUCCESS;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("interrupted");
                        break;
                    }
                    event = job.next_error() => match event {
                        Some(err) => {
                            eprintln!("error: {:#}", err);
                            code = fnctl_cli::EXIT_SYSTEM_ERROR;
                        }
                        None => break,
                    }
                }
            }
            job.stop().await;
            return Ok(code);
        }
        Commands::Stop { port, path } => match client.stop(&path, port)? {
            StopOutcome::Released => println!("{}", fnctl_cli::released_message(port)),
            StopOutcome::NotRunning => {
                println!("nothing running on port {}", port);
                return Ok(fnctl_cli::EXIT_NOOP);
            }
        },
        Commands::Invoke {
            path,
            target,
            data,
            content_type,
            format,
        } => {
            let mut message = fnctl_api::invoker::InvokeMessage {
                format,
                ..Default::default()
            };
            if let Some(data) = data {
                message.data = data;
            }
            if let Some(content_type) = content_type {
                message.content_type = content_type;
            }
            let response = client.invoke(&path, &target, &message).await?;
            for (key, values) in &response.metadata {
                log::info!("{}: {}", key, values.join(", "));
            }
            println!("{}", response.body);
        }
        Commands::List { namespace, json } => {
            let instances = client.list(namespace.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&instances)?);
            } else {
                for instance in &instances {
                    println!(
                        "{}\t{}\t{}\t{}",
                        instance.name,
                        instance.namespace.as_deref().unwrap_or("-"),
                        instance.endpoint.as_deref().unwrap_or("-"),
                        if instance.ready { "ready" } else { "not ready" }
                    );
                }
            }
        }
        Commands::Describe { path, name, json } => {
            let path = project_path(path, &name);
            let description = client.describe(name.as_deref(), path.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&description)?);
            } else {
                println!("name:      {}", description.name);
                if let Some(root) = &description.root {
                    println!("root:      {}", root.display());
                }
                if let Some(runtime) = &description.runtime {
                    println!("runtime:   {}", runtime);
                }
                match (&description.image, &description.digest) {
                    (Some(image), Some(digest)) => println!("image:     {}@{}", image, digest),
                    _ => println!("image:     not built"),
                }
                let ports: Vec<String> = description.local_ports.iter().map(|p| p.to_string()).collect();
                println!("local:     {}", if ports.is_empty() { "-".to_string() } else { ports.join(", ") });
                match &description.deployed {
                    Some(live) => println!(
                        "deployed:  {} ({})",
                        live.endpoint.as_deref().unwrap_or("-"),
                        if live.ready { "ready" } else { "not ready" }
                    ),
                    None => println!("deployed:  no"),
                }
                if description.stale {
                    println!(
                        "warning:   recorded endpoint {} is not reported by the deployer",
                        description.recorded_endpoint.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Remove { path, name } => match client.remove(name.as_deref(), project_path(path, &name).as_deref()).await? {
            RemoveOutcome::Removed => println!("removed"),
            RemoveOutcome::NothingDeployed => {
                println!("nothing deployed");
                return Ok(fnctl_cli::EXIT_NOOP);
            }
        },
    }
    Ok(fnctl_cli::EXIT_SUCCESS)
}
