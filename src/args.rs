use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "voxreel", about = "Narrated short-form videos from text")]
pub struct Args {
    /// TOML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the configured artifact directory
    #[clap(long, global = true)]
    pub artifact_dir: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Synthesize narration audio from text
    Tts {
        #[clap(long)]
        text: String,

        #[clap(long, default_value = "en")]
        lang: String,

        #[clap(long, default_value = "us")]
        voice: String,

        #[clap(long, default_value_t = 1.0)]
        speed: f64,
    },

    /// Render narration over a background image or clip
    Video {
        #[clap(long)]
        background: PathBuf,

        #[clap(long, default_value = "16:9")]
        aspect: String,

        /// Narration file name returned by `tts`
        #[clap(long, default_value = "")]
        audio_filename: String,

        /// Narration text to caption
        #[clap(long)]
        text: Option<String>,
    },

    /// Copy an artifact out of the store
    Download {
        filename: String,

        #[clap(long)]
        dest: PathBuf,
    },

    /// List the configured voices
    Voices,
}
