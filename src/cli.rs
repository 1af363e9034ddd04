use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "espen",
    version,
    about = "Serve the family video of the day and rotate it once per day"
)]
pub struct Cli {
    #[command(flatten)]
    pub options: GlobalOptions,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Args)]
pub struct GlobalOptions {
    /// Directory holding the espen<N>.mp4 files
    #[arg(long, global = true, env = "ESPEN_VIDEOS_DIR")]
    pub videos_dir: Option<PathBuf>,

    /// Where the daily selection is persisted
    #[arg(
        long,
        global = true,
        env = "ESPEN_STATE_BACKEND",
        value_enum,
        default_value_t = StoreKind::File
    )]
    pub state_backend: StoreKind,

    /// State file for the `file` backend [default: <videos-dir>/daily_pick.txt]
    #[arg(long, global = true, env = "ESPEN_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Database for the `sqlite` backend
    #[arg(long, global = true, env = "ESPEN_STATE_DB")]
    pub state_db: Option<PathBuf>,

    /// IANA time zone deciding when a new day starts
    #[arg(long = "tz", global = true, env = "ESPEN_TZ", default_value = "Europe/Oslo")]
    pub time_zone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    File,
    Sqlite,
    Memory,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show today's video, advancing the rotation if the day changed
    Today(DateArg),
    /// Show the stored selection without changing it
    Status(DateArg),
    /// List candidate videos
    List,
    /// Force today's video to a specific number
    Pin {
        id: u64,
        #[command(flatten)]
        date: DateArg,
    },
    /// Copy an .mp4 into the library under the first free number
    Add { file: PathBuf },
    /// Delete a video from the library by file name
    Remove { filename: String },
    /// Run the HTTP service
    Serve(ServeArgs),
}

#[derive(Debug, Default, Args)]
pub struct DateArg {
    /// Use this day (YYYY-MM-DD) instead of the current one
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, env = "ESPEN_PORT", default_value_t = 8000)]
    pub port: u16,

    /// OAuth userinfo endpoint used to verify bearer tokens
    #[arg(long, env = "OAUTH2_USERINFO")]
    pub userinfo_url: Option<String>,

    /// Phone numbers allowed through, comma separated
    #[arg(long = "allow", env = "ESPEN_ALLOWED_NUMBERS", value_delimiter = ',')]
    pub allowed_numbers: Vec<String>,

    /// Disable authorization (also enabled by DEV=yes)
    #[arg(long)]
    pub dev: bool,

    /// Largest accepted upload in MiB
    #[arg(long, env = "ESPEN_UPLOAD_LIMIT_MB", default_value_t = 512)]
    pub upload_limit_mb: usize,
}
