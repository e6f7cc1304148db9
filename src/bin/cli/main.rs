//! CLI tool for jarcloak archive protection.

mod commands;
mod exit_codes;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use exit_codes::ExitCode;

/// Protects application classes inside Java archives
#[derive(Parser)]
#[command(name = "jarcloak")]
#[command(author, version, about = "Protects application classes inside Java archives", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress the entry tree
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode classes under a package and patch the class reader (alias: p)
    #[command(alias = "p")]
    Protect {
        /// Package whose classes are encoded, e.g. com.acme.app
        package: String,

        /// Archive to protect (.jar or .war)
        archive: PathBuf,

        /// Also trace resources and log at debug level
        #[arg(long)]
        debug: bool,

        /// Output file (default: <name>-enc.<ext> next to the input)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Pipeline
        #[arg(short = 'm', long, value_enum, default_value = "streaming")]
        mode: Mode,

        /// Patch strength
        #[arg(short = 's', long, value_enum, default_value = "strong")]
        strength: Strength,

        /// Encoder program; class bytes on stdin, encoded bytes on stdout
        #[arg(short = 'e', long, env = "JARCLOAK_ENCODER")]
        encoder: String,

        /// Argument passed to the encoder (repeatable)
        #[arg(long = "encoder-arg", allow_hyphen_values = true)]
        encoder_args: Vec<String>,

        /// Internal name of the decode helper class
        #[arg(long)]
        helper_class: Option<String>,

        /// Compiled decode helper class added when the weak patch is injected
        #[arg(long)]
        helper_file: Option<PathBuf>,

        /// Class path left unencoded (repeatable)
        #[arg(short = 'x', long)]
        ignore_class: Vec<String>,

        /// Deflate level (0-9)
        #[arg(short = 'l', long, default_value = "6")]
        level: u32,

        /// Directory for the two-pass scratch tree
        #[arg(long)]
        scratch_dir: Option<PathBuf>,
    },

    /// Print the encoder output for a string as hex (alias: e)
    #[command(alias = "e")]
    Encode {
        /// Text to encode
        text: String,

        /// Encoder program
        #[arg(short = 'e', long, env = "JARCLOAK_ENCODER")]
        encoder: String,

        /// Argument passed to the encoder (repeatable)
        #[arg(long = "encoder-arg", allow_hyphen_values = true)]
        encoder_args: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    TwoPass,
    Streaming,
}

impl From<Mode> for jarcloak::PipelineMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::TwoPass => jarcloak::PipelineMode::TwoPass,
            Mode::Streaming => jarcloak::PipelineMode::Streaming,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Strength {
    Weak,
    Strong,
}

impl From<Strength> for jarcloak::PatchStrength {
    fn from(strength: Strength) -> Self {
        match strength {
            Strength::Weak => jarcloak::PatchStrength::Weak,
            Strength::Strong => jarcloak::PatchStrength::Strong,
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Protect {
            package,
            archive,
            debug,
            output,
            mode,
            strength,
            encoder,
            encoder_args,
            helper_class,
            helper_file,
            ignore_class,
            level,
            scratch_dir,
        } => {
            init_logging(debug);
            commands::protect(&commands::ProtectConfig {
                package: &package,
                archive_path: &archive,
                output_path: output.as_deref(),
                debug,
                mode,
                strength,
                encoder: &encoder,
                encoder_args: &encoder_args,
                helper_class: helper_class.as_deref(),
                helper_file: helper_file.as_deref(),
                ignore_classes: &ignore_class,
                level,
                scratch_dir: scratch_dir.as_deref(),
                quiet: cli.quiet,
            })
        }

        Commands::Encode {
            text,
            encoder,
            encoder_args,
        } => {
            init_logging(false);
            commands::encode(&text, &encoder, &encoder_args)
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}
