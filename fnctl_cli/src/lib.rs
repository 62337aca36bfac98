// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-License-Identifier: MIT
pub mod config;
pub mod strategies;

pub use config::fnctl_cli_default_conf;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_SYSTEM_ERROR: i32 = 1;
pub const EXIT_USER_ERROR: i32 = 2;
pub const EXIT_NOOP: i32 = 3;

/// Assemble a client whose strategies run the commands configured in `settings`.
pub fn client_from_settings(settings: &config::CliSettings) -> fnctl_core::Client {
    let mut client = fnctl_core::Client::new()
        .with_registry(settings.registry.clone())
        .with_namespace(settings.namespace.clone());
    if let Some(command) = &settings.build.command {
        client = client.with_builder(Box::new(strategies::CommandBuilder::new(command.clone())));
    }
    if let Some(command) = &settings.push.command {
        client = client.with_pusher(Box::new(strategies::CommandPusher::new(command.clone())));
    }
    let deploy = &settings.deploy;
    if deploy.command.is_some() || deploy.describe_command.is_some() || deploy.list_command.is_some() || deploy.remove_command.is_some() {
        client = client.with_deployer(Box::new(strategies::CommandDeployer::new(deploy.clone())));
    }
    if settings.run.command.is_some() {
        client = client.with_runner(std::sync::Arc::new(strategies::CommandRunner::new(settings.run.clone())));
    }
    client
}

/// Report for `stop`, which only frees the port marker.
pub fn released_message(port: u16) -> String {
    format!("marker of port {} released, the process (if any) was not terminated", port)
}

/// Exit status for a failed command: user errors are told apart from
/// failures of the system or of a backend.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<fnctl_api::error::Error>().map(|e| e.kind()) {
        Some(fnctl_api::error::ErrorKind::User) => EXIT_USER_ERROR,
        Some(fnctl_api::error::ErrorKind::System) | None => EXIT_SYSTEM_ERROR,
    }
}
