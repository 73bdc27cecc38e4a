// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! tcagent - TeamCity cloud agent updater
//!
//! Updates the machine image of a TeamCity Cloud Profile and disables agents
//! still running the superseded image (`update-cloud-profile`, the default
//! command), and garbage-collects disabled agents once no build is active on
//! them (`remove-disabled-agents`).
//!
//! Fatal remote-call failures exit with a reserved code per failure class
//! (2-12); see `teamcity_client::Error::exit_code`.

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use teamcity_client::TeamCityClient;
use tracing::error;

#[derive(Parser)]
#[command(
    name = "tcagent",
    version,
    about = "Update images for TeamCity cloud agents, via the TeamCity REST API"
)]
struct Cli {
    /// Verbose output
    #[arg(long, global = true)]
    verbose: bool,

    // `update-cloud-profile` is the default command: its options are also
    // accepted at the top level when no subcommand is named.
    #[command(flatten)]
    update: UpdateArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Update a Cloud Profile's image and disable agents on the old one (default)
    UpdateCloudProfile(UpdateArgs),

    /// Remove disabled agents whose image has been superseded
    RemoveDisabledAgents(RemoveArgs),
}

#[derive(Args, Clone)]
struct UpdateArgs {
    /// A valid TeamCity user access token (requires TC 2019.1)
    #[arg(long)]
    token: Option<String>,

    /// The url of the TeamCity server, eg "https://teamcity.example.com"
    #[arg(long)]
    server: Option<String>,

    /// The AMI id (for AWS), or full url to the VHD / resource id of the
    /// managed image (for Azure)
    #[arg(long)]
    image: Option<String>,

    /// The name of the TeamCity Cloud Profile to modify
    #[arg(long)]
    cloudprofile: Option<String>,

    /// The agent prefix used in the Cloud Profile image that should be updated
    #[arg(long)]
    agentprefix: Option<String>,

    /// Output what changes the app would make, but dont actually make the changes
    #[arg(long)]
    dryrun: bool,
}

#[derive(Args, Clone)]
struct RemoveArgs {
    /// A valid TeamCity user access token (requires TC 2019.1)
    #[arg(long)]
    token: String,

    /// The url of the TeamCity server, eg "https://teamcity.example.com"
    #[arg(long)]
    server: String,

    /// Output what changes the app would make, but dont actually make the changes
    #[arg(long)]
    dryrun: bool,
}

/// Unwrap an option of the default command, reporting a clap-style
/// missing-argument diagnostic when absent.
fn require(value: Option<String>, name: &str) -> String {
    match value {
        Some(v) => v,
        None => {
            let mut cmd = Cli::command();
            cmd.error(
                ErrorKind::MissingRequiredArgument,
                format!("the following required option was not provided: --{name}"),
            )
            .exit();
        }
    }
}

async fn update_cloud_profile(args: UpdateArgs) -> Result<(), teamcity_client::Error> {
    let token = require(args.token, "token");
    let server = require(args.server, "server");
    let image = require(args.image, "image");
    let cloudprofile = require(args.cloudprofile, "cloudprofile");
    let agentprefix = require(args.agentprefix, "agentprefix");

    let client = TeamCityClient::new(&server, &token)?;
    client
        .update_cloud_image(&cloudprofile, &agentprefix, &image, args.dryrun)
        .await
}

async fn remove_disabled_agents(args: RemoveArgs) -> Result<(), teamcity_client::Error> {
    let client = TeamCityClient::new(&args.server, &args.token)?;
    client.remove_superseded_agents(args.dryrun).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "tcagent=debug,teamcity_client=debug"
    } else {
        "tcagent=info,teamcity_client=info"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Some(Commands::UpdateCloudProfile(args)) => update_cloud_profile(args).await,
        Some(Commands::RemoveDisabledAgents(args)) => remove_disabled_agents(args).await,
        None => update_cloud_profile(cli.update).await,
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(err.exit_code());
    }
}
