// CLI configuration
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// speexogg - Speex/Ogg encoding command-line tool
#[derive(Parser, Debug)]
#[command(name = "speexogg")]
#[command(about = "Encode WAV or raw PCM audio into Speex inside Ogg", long_about = None)]
#[command(version)]
pub struct Config {
    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub format: OutputFormat,

    /// Quiet mode (suppress progress messages)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Pretty,
    /// Compact JSON
    Json,
    /// Key-value pairs
    KeyValue,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the audio format of WAV file(s)
    Info {
        /// WAV file paths or glob patterns (e.g. "*.wav")
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,
    },

    /// List the pages of an Ogg Speex stream
    Pages {
        /// Ogg Speex file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Encode a WAV (or raw 16-bit little-endian PCM) file
    #[cfg(feature = "native-speex")]
    Encode(EncodeArgs),
}

#[cfg(feature = "native-speex")]
#[derive(clap::Args, Debug)]
pub struct EncodeArgs {
    /// Input WAV file, or raw PCM with --raw-rate
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output .spx/.ogg file
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON file holding an encoding session config; flags override it
    #[arg(long)]
    pub preset: Option<PathBuf>,

    /// Speex mode
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Encoding quality (0-10)
    #[arg(long)]
    pub quality: Option<i32>,

    /// Output sample rate in Hz (8000, 16000, 32000, 44100)
    #[arg(short, long)]
    pub rate: Option<u32>,

    /// Treat the input as raw PCM recorded at this rate
    #[arg(long)]
    pub raw_rate: Option<u32>,

    /// Comment to store in the stream (KEY=value), repeatable
    #[arg(short, long = "comment")]
    pub comments: Vec<String>,
}

#[cfg(feature = "native-speex")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Narrowband,
    Wideband,
    UltraWideband,
}

#[cfg(feature = "native-speex")]
impl From<ModeArg> for speexogg::SpeexMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Narrowband => speexogg::SpeexMode::Narrowband,
            ModeArg::Wideband => speexogg::SpeexMode::Wideband,
            ModeArg::UltraWideband => speexogg::SpeexMode::UltraWideband,
        }
    }
}
