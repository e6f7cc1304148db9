//! Command implementations for the CLI.

use std::io::{self, Write};
use std::path::Path;

use jarcloak::hook::{CommandHook, EncodeHook, to_hex};
use jarcloak::protect::output_path_for;
use jarcloak::trace::{NoTrace, Trace, TreeTrace};
use jarcloak::{ArchivePolicy, ProtectStats, Protector};

use crate::exit_codes::{ExitCode, error_to_exit_code};
use crate::{Mode, Strength};

/// Configuration for the protect command
pub struct ProtectConfig<'a> {
    pub package: &'a str,
    pub archive_path: &'a Path,
    pub output_path: Option<&'a Path>,
    pub debug: bool,
    pub mode: Mode,
    pub strength: Strength,
    pub encoder: &'a str,
    pub encoder_args: &'a [String],
    pub helper_class: Option<&'a str>,
    pub helper_file: Option<&'a Path>,
    pub ignore_classes: &'a [String],
    pub level: u32,
    pub scratch_dir: Option<&'a Path>,
    pub quiet: bool,
}

/// Protect command implementation
pub fn protect(config: &ProtectConfig<'_>) -> ExitCode {
    if config.package.trim().is_empty() {
        eprintln!("Error: package must not be empty");
        return ExitCode::BadArgs;
    }
    if config.level > 9 {
        eprintln!("Error: level must be between 0 and 9");
        return ExitCode::BadArgs;
    }

    let policy = match build_policy(config) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let encoder = CommandHook::new(config.encoder).args(config.encoder_args);
    let output = config
        .output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output_path_for(config.archive_path));

    let stdout = io::stdout();
    let mut tree;
    let mut quiet = NoTrace;
    let trace: &mut dyn Trace = if config.quiet {
        &mut quiet
    } else {
        tree = TreeTrace::new(stdout.lock(), policy.is_debug());
        &mut tree
    };

    let result = Protector::new(&policy, &encoder).protect_file(
        config.archive_path,
        &output,
        config.mode.into(),
        trace,
    );
    match result {
        Ok(stats) => {
            if !config.quiet {
                print_summary(&stats, &output);
            }
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            error_to_exit_code(&e)
        }
    }
}

/// Encode command implementation
pub fn encode(text: &str, encoder: &str, encoder_args: &[String]) -> ExitCode {
    let hook = CommandHook::new(encoder).args(encoder_args);
    match hook.encode(text.as_bytes()) {
        Ok(encoded) => {
            println!("{}", to_hex(&encoded));
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error: encoder failed: {}", e);
            ExitCode::IoError
        }
    }
}

fn build_policy(config: &ProtectConfig<'_>) -> Result<ArchivePolicy, ExitCode> {
    let mut policy = ArchivePolicy::new(config.package)
        .debug(config.debug)
        .strength(config.strength.into())
        .compression_level(config.level);
    if let Some(helper) = config.helper_class {
        policy = policy.helper_class(helper);
    }
    if let Some(path) = config.helper_file {
        match std::fs::read(path) {
            Ok(bytes) => policy = policy.helper_bytes(bytes),
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", path.display(), e);
                return Err(ExitCode::IoError);
            }
        }
    }
    for class in config.ignore_classes {
        policy = policy.ignore_class(class.as_str());
    }
    if let Some(dir) = config.scratch_dir {
        policy = policy.scratch_root(dir);
    }
    Ok(policy)
}

fn print_summary(stats: &ProtectStats, output: &Path) {
    let mut out = io::stdout().lock();
    // A closed stdout is not worth failing a finished run for.
    let _ = writeln!(
        out,
        "{} classes encoded, {} shim classes patched ({} hooks), {} archives, {} merged",
        stats.encoded, stats.patched, stats.hooks_injected, stats.archives, stats.merged
    );
    let _ = writeln!(
        out,
        "{} -> {} bytes: {}",
        stats.bytes_in,
        stats.bytes_out,
        output.display()
    );
}
