use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "audiograb")]
#[command(author, version, about = "Extract the audio track of a media file")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List output formats and whether this machine can produce them
    Formats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert one file to an audio format
    Convert {
        /// Input media file
        #[arg(required = true)]
        input: PathBuf,

        /// Output format id (see `formats`)
        #[arg(short, long, default_value = "mp3")]
        format: String,

        /// Directory for the converted file (overrides config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_defaults_to_mp3() {
        let cli = Cli::parse_from(["audiograb", "convert", "clip.mov"]);
        match cli.command {
            Commands::Convert {
                input,
                format,
                output_dir,
                overwrite,
            } => {
                assert_eq!(input, PathBuf::from("clip.mov"));
                assert_eq!(format, "mp3");
                assert!(output_dir.is_none());
                assert!(!overwrite);
            }
            _ => panic!("Expected convert command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["audiograb", "formats", "--json", "-v", "-c", "a.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        assert!(matches!(cli.command, Commands::Formats { json: true }));
    }
}
