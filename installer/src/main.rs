//! sysfat: install the syslinux boot loader onto an unmounted FAT volume.

mod cli;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sysfat_core::fs::{NativeFat, NativeResolver};
use sysfat_core::install::{self, InstallContext, InstallError, LoaderSet};
use sysfat_core::{logger, SECTOR_SIZE};

use cli::{Args, Command, USAGE};

/// Anything that stops a run before or during the install.
#[derive(Debug)]
enum AppError {
    Load { path: PathBuf, source: io::Error },
    BootStubSize { path: PathBuf, len: usize },
    Install(InstallError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { path, source } => write!(f, "{}: {}", path.display(), source),
            Self::BootStubSize { path, len } => write!(
                f,
                "{}: boot sector template is {} bytes, expected {}",
                path.display(),
                len,
                SECTOR_SIZE
            ),
            Self::Install(err) => write!(f, "{}", err),
        }
    }
}

impl From<InstallError> for AppError {
    fn from(err: InstallError) -> Self {
        Self::Install(err)
    }
}

impl AppError {
    /// The one line printed for a fatal error; install failures name their step.
    fn diagnostic(&self, program: &str) -> String {
        match self {
            Self::Install(err) => format!("{}: {}: {}", program, err.step(), err),
            _ => format!("{}: {}", program, self),
        }
    }
}

fn load(path: &Path) -> Result<Vec<u8>, AppError> {
    std::fs::read(path).map_err(|source| AppError::Load {
        path: path.to_path_buf(),
        source,
    })
}

fn load_loaders(args: &Args) -> Result<LoaderSet, AppError> {
    let stub = load(&args.bootsect)?;
    let boot_stub: [u8; SECTOR_SIZE] =
        stub.as_slice()
            .try_into()
            .map_err(|_| AppError::BootStubSize {
                path: args.bootsect.clone(),
                len: stub.len(),
            })?;

    Ok(LoaderSet {
        boot_stub,
        primary: load(&args.loader)?,
        secondary: args.module.as_deref().map(load).transpose()?,
    })
}

fn open_device(path: &str) -> Result<File, InstallError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| InstallError::DeviceAccess {
            path: path.to_string(),
            source,
        })
}

fn run(program: &str, args: Args) -> Result<(), AppError> {
    let loaders = load_loaders(&args)?;
    let device = open_device(&args.device)?;

    let mut ctx = InstallContext::new(program, args.device.as_str(), args.options);
    let mut writer = NativeFat::new();
    let report = install::install(&mut ctx, &device, &mut writer, &NativeResolver, &loaders)?;

    log::info!(
        "installed {} ({} sectors, {} patched)",
        report.primary_path,
        report.chain.len(),
        report.patched_sectors
    );
    if !ctx.warnings().is_empty() {
        log::debug!("{} warning(s)", ctx.warnings().len());
    }
    Ok(())
}

fn main() -> ExitCode {
    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_else(|| "sysfat".to_string());

    let command = match cli::parse(argv) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{}: {}", program, err);
            if err.show_usage() {
                eprint!("{}", USAGE);
            }
            return ExitCode::from(err.exit_code());
        }
    };

    let args = match command {
        Command::Help => {
            print!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Command::Install(args) => args,
    };

    let env_level = std::env::var(logger::LOG_ENV).ok();
    let level = logger::level_for(args.verbose, env_level.as_deref());
    if let Err(err) = logger::init(&program, level) {
        eprintln!("{}: {}", program, err);
    }

    match run(&program, args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Not through the logger: SYSFAT_LOG=off must not hide it
            eprintln!("{}", err.diagnostic(&program));
            ExitCode::from(1)
        }
    }
}
