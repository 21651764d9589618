use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use strava_api::ActivityType;

#[derive(Debug, Parser)]
#[command(name = "stravup", version, about = "Upload activity files to Strava")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a .fit, .tcx or .gpx file and wait until Strava has processed it
    Upload(UploadArgs),
    /// Authorize with Strava and store the session
    Login,
    /// Revoke the stored session
    Logout,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    pub file: PathBuf,

    #[arg(long, short = 't', default_value = "Run", value_parser = parse_activity_type)]
    pub activity_type: ActivityType,

    #[arg(long, short)]
    pub name: Option<String>,

    #[arg(long, short)]
    pub description: Option<String>,

    #[arg(long)]
    pub private: bool,

    #[arg(long)]
    pub commute: bool,

    #[arg(long)]
    pub trainer: bool,

    /// Identifier of the file in your own system
    #[arg(long)]
    pub external_id: Option<String>,
}

fn parse_activity_type(s: &str) -> Result<ActivityType, String> {
    s.parse().map_err(|e: strava_api::endpoints::ActivityTypeParseError| e.to_string())
}
