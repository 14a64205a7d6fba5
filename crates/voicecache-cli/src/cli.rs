//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use voicecache_core::Config;

/// voicecache - keep a static site usable offline.
#[derive(Parser, Debug)]
#[command(name = "voicecache")]
#[command(
    author,
    version,
    about,
    long_about = r#"voicecache maintains one versioned cache of a site's static assets.

Assets are served cache-first while a background fetch refreshes the cache.
Bumping the cache version installs a new generation and deletes the old ones
when it activates.

Examples:
    voicecache --origin https://voice.example/ update
    voicecache fetch ./lessons.js
    voicecache status --entries
    voicecache update --wait --message '{"type":"SKIP_WAITING"}'
"#
)]
pub struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Scope URL of the site being cached.
    #[arg(long, global = true, value_name = "URL")]
    pub origin: Option<String>,

    /// Cache version tag (the cache name).
    #[arg(long = "cache-version", global = true, value_name = "TAG")]
    pub cache_version: Option<String>,

    /// Directory holding cache files.
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the configured version and activate it.
    Update {
        /// Install only; leave the version waiting and older caches in place.
        #[arg(long)]
        wait: bool,

        /// Control message to post to the waiting version, as JSON.
        #[arg(long, value_name = "JSON", requires = "wait")]
        message: Option<String>,
    },

    /// Fetch a path or URL through the cache.
    Fetch {
        /// Path relative to the origin, or an absolute URL.
        target: String,

        #[arg(long, short = 'X', default_value = "GET")]
        method: String,

        /// Print the status line and headers to stderr.
        #[arg(long, short)]
        include: bool,
    },

    /// List caches and their contents.
    Status {
        /// Show every cached entry.
        #[arg(long)]
        entries: bool,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Delete every cache except the configured version.
    Purge,
}

impl Cli {
    /// Command-line flags take precedence over file and environment.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref origin) = self.origin {
            config.origin = Some(origin.clone());
        }
        if let Some(ref version) = self.cache_version {
            config.version = version.clone();
        }
        if let Some(ref dir) = self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
    }
}
