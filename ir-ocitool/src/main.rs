mod subcmds;

use clap::{Parser, Subcommand};
use ir_ocitool::{config, Compression, Config, ToolResult};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli
{
    /// skopeo binary used to talk to registries
    #[arg(long, env = "SKOPEO", default_value = config::DEFAULT_SKOPEO, global = true)]
    skopeo: String,

    /// Extra argument for "skopeo copy", can be repeated
    #[arg(long = "skopeo-arg", allow_hyphen_values = true, global = true)]
    skopeo_args: Vec<String>,

    /// Directory to create scratch images in, none to use the system default
    #[arg(long, global = true)]
    tmpdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Push files to an OCI image
    Push
    {
        /// OCI image reference (e.g. quay.io/repo/image)
        image: String,

        /// Files to push
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// How to store the layer
        #[arg(short = 't', long = "type", default_value_t, value_enum)]
        compression: Compression,
    },

    /// Pull files from an OCI image
    Pull
    {
        /// OCI image reference (e.g. quay.io/repo/image)
        image: String,

        /// Directory to extract the files to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Fail if a layer blob is missing after the copy
        #[arg(short, long)]
        strict: bool,
    },

    /// Pack files into a local directory-format image
    Build
    {
        /// Path to the image directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Files to pack
        files: Vec<PathBuf>,

        /// How to store the layer
        #[arg(short = 't', long = "type", default_value_t, value_enum)]
        compression: Compression,
    },

    /// Unpack files from a local directory-format image
    Extract
    {
        /// Path to the image directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Directory to extract the files to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Fail if a layer blob is missing
        #[arg(short, long)]
        strict: bool,
    },
}

fn run(cli: Cli) -> ToolResult<()>
{
    let mut config = Config {
        skopeo: cli.skopeo,
        skopeo_args: cli.skopeo_args,
        scratch_root: cli.tmpdir,
        ..Default::default()
    };

    match cli.command {
        Commands::Push {
            image,
            files,
            compression,
        } => {
            config.compression = compression;
            subcmds::cmd_push(&config, &image, &files)?
        }
        Commands::Pull {
            image,
            output,
            strict,
        } => {
            config.strict = strict;
            subcmds::cmd_pull(&config, &image, &output)?
        }
        Commands::Build {
            dir,
            files,
            compression,
        } => {
            config.compression = compression;
            subcmds::cmd_build(&config, &dir, &files)?
        }
        Commands::Extract {
            dir,
            output,
            strict,
        } => {
            config.strict = strict;
            subcmds::cmd_extract(&config, &dir, &output)?
        }
    }

    Ok(())
}

fn main() -> ExitCode
{
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
