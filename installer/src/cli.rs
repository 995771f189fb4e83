// Command-line parsing for sysfat

use std::fmt;
use std::path::PathBuf;

use sysfat_core::boot::PatchFlags;
use sysfat_core::install::InstallOptions;

pub const USAGE: &str = "\
Usage: sysfat [options] --bootsect FILE --loader FILE [--module FILE] DEVICE

  -b, --bootsect FILE   boot sector template (512 bytes)
  -l, --loader FILE     primary loader image
  -m, --module FILE     secondary loader module
  -d, --directory DIR   install into DIR instead of the root
  -t, --offset N        byte offset of the filesystem (decimal or 0x hex)
  -f, --force           do not require a block device or regular file
  -s, --stupid          read one sector at a time at boot
  -r, --raid            return to the BIOS on boot failure
  -v, --verbose         report progress
  -h, --help            show this help

Set SYSFAT_LOG=debug for a step-by-step trace.
";

/// EX_USAGE from sysexits.h
pub const EXIT_USAGE: u8 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    UnknownOption(String),
    MissingValue(String),
    InvalidOffset(String),
    MissingArgument(&'static str),
    ExtraArgument(String),
    /// A recognized option this installer does not implement
    NotImplemented,
}

impl UsageError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NotImplemented => 1,
            _ => EXIT_USAGE,
        }
    }

    /// Whether the usage text should follow the message.
    pub fn show_usage(&self) -> bool {
        !matches!(self, Self::NotImplemented)
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOption(opt) => write!(f, "unrecognized option '{}'", opt),
            Self::MissingValue(opt) => write!(f, "option '{}' requires an argument", opt),
            Self::InvalidOffset(value) => write!(f, "invalid offset '{}'", value),
            Self::MissingArgument(what) => write!(f, "missing {}", what),
            Self::ExtraArgument(arg) => write!(f, "unexpected argument '{}'", arg),
            Self::NotImplemented => write!(
                f,
                "At least one specified option not yet implemented for this installer."
            ),
        }
    }
}

impl std::error::Error for UsageError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub device: String,
    pub bootsect: PathBuf,
    pub loader: PathBuf,
    pub module: Option<PathBuf>,
    pub verbose: bool,
    pub options: InstallOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Install(Args),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Opt {
    Bootsect,
    Loader,
    Module,
    Directory,
    Offset,
    Force,
    Stupid,
    Raid,
    Verbose,
    Help,
    /// Recognized and refused
    Unsupported { takes_value: bool },
}

impl Opt {
    fn short(c: char) -> Option<Self> {
        Some(match c {
            'b' => Self::Bootsect,
            'l' => Self::Loader,
            'm' => Self::Module,
            'd' => Self::Directory,
            't' => Self::Offset,
            'f' => Self::Force,
            's' => Self::Stupid,
            'r' => Self::Raid,
            'v' => Self::Verbose,
            'h' => Self::Help,
            'S' | 'H' | 'o' | 'M' => Self::Unsupported { takes_value: true },
            'z' | 'O' | 'U' => Self::Unsupported { takes_value: false },
            _ => return None,
        })
    }

    fn long(name: &str) -> Option<Self> {
        Some(match name {
            "bootsect" => Self::Bootsect,
            "loader" => Self::Loader,
            "module" => Self::Module,
            "directory" => Self::Directory,
            "offset" => Self::Offset,
            "force" => Self::Force,
            "stupid" => Self::Stupid,
            "raid" => Self::Raid,
            "verbose" => Self::Verbose,
            "help" => Self::Help,
            "sectors" | "heads" | "once" | "menu-save" => Self::Unsupported { takes_value: true },
            "zipdrive" | "clear-once" | "reset-adv" | "update" => {
                Self::Unsupported { takes_value: false }
            }
            _ => return None,
        })
    }

    fn takes_value(&self) -> bool {
        match self {
            Self::Bootsect | Self::Loader | Self::Module | Self::Directory | Self::Offset => true,
            Self::Unsupported { takes_value } => *takes_value,
            _ => false,
        }
    }
}

/// Decimal, or hexadecimal with a `0x` prefix.
pub fn parse_offset(value: &str) -> Result<u64, UsageError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|_| UsageError::InvalidOffset(value.to_string()))
}

#[derive(Default)]
struct Builder {
    device: Option<String>,
    bootsect: Option<PathBuf>,
    loader: Option<PathBuf>,
    module: Option<PathBuf>,
    verbose: bool,
    help: bool,
    unsupported: bool,
    options: InstallOptions,
}

impl Builder {
    fn apply(&mut self, opt: Opt, value: Option<String>) -> Result<(), UsageError> {
        match (opt, value) {
            (Opt::Bootsect, Some(v)) => self.bootsect = Some(PathBuf::from(v)),
            (Opt::Loader, Some(v)) => self.loader = Some(PathBuf::from(v)),
            (Opt::Module, Some(v)) => self.module = Some(PathBuf::from(v)),
            (Opt::Directory, Some(v)) => self.options.directory = Some(v),
            (Opt::Offset, Some(v)) => self.options.offset = parse_offset(&v)?,
            (Opt::Force, _) => self.options.force = true,
            (Opt::Stupid, _) => self.options.flags |= PatchFlags::STUPID,
            (Opt::Raid, _) => self.options.flags |= PatchFlags::RAID,
            (Opt::Verbose, _) => self.verbose = true,
            (Opt::Help, _) => self.help = true,
            (Opt::Unsupported { .. }, _) => self.unsupported = true,
            // takes_value() guarantees a value for the rest
            (_, None) => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<Command, UsageError> {
        if self.help {
            return Ok(Command::Help);
        }
        if self.unsupported {
            return Err(UsageError::NotImplemented);
        }
        Ok(Command::Install(Args {
            device: self.device.ok_or(UsageError::MissingArgument("device"))?,
            bootsect: self
                .bootsect
                .ok_or(UsageError::MissingArgument("--bootsect FILE"))?,
            loader: self
                .loader
                .ok_or(UsageError::MissingArgument("--loader FILE"))?,
            module: self.module,
            verbose: self.verbose,
            options: self.options,
        }))
    }
}

/// Parse everything after the program name.
pub fn parse<I>(args: I) -> Result<Command, UsageError>
where
    I: IntoIterator<Item = String>,
{
    let mut builder = Builder::default();
    let mut args = args.into_iter();
    let mut only_positional = false;

    while let Some(arg) = args.next() {
        if only_positional || arg == "-" || !arg.starts_with('-') {
            if builder.device.is_some() {
                return Err(UsageError::ExtraArgument(arg));
            }
            builder.device = Some(arg);
            continue;
        }
        if arg == "--" {
            only_positional = true;
            continue;
        }

        if let Some(long) = arg.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (long, None),
            };
            let opt = Opt::long(name).ok_or_else(|| UsageError::UnknownOption(arg.clone()))?;
            let value = if opt.takes_value() {
                match inline {
                    Some(v) => Some(v),
                    None => Some(args.next().ok_or_else(|| UsageError::MissingValue(arg.clone()))?),
                }
            } else {
                None
            };
            builder.apply(opt, value)?;
            continue;
        }

        // Clustered short options: -fs, -dboot, -d boot
        let cluster: Vec<char> = arg[1..].chars().collect();
        for (i, &c) in cluster.iter().enumerate() {
            let opt = Opt::short(c).ok_or_else(|| UsageError::UnknownOption(format!("-{}", c)))?;
            if !opt.takes_value() {
                builder.apply(opt, None)?;
                continue;
            }
            let rest: String = cluster[i + 1..].iter().collect();
            let value = if rest.is_empty() {
                args.next()
                    .ok_or_else(|| UsageError::MissingValue(format!("-{}", c)))?
            } else {
                rest
            };
            builder.apply(opt, Some(value))?;
            break;
        }
    }

    builder.finish()
}
