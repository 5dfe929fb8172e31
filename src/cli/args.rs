//! Command-line argument definitions for the EPF importer
//!
//! Options left unset fall back to the values of the configuration file,
//! which is created with preset defaults on first use.

use crate::config::{ConfigPreset, ImportConfig};
use crate::constants::{DEFAULT_CONFIG_PATH, DEFAULT_FLAT_CONFIG_PATH, DEFAULT_SNAPSHOT_PATH};
use crate::error::{IngestError, Result};
use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the EPF importer
///
/// Imports EPF and EPF Flat export directories into a relational database.
/// Each file becomes one table; full exports replace the table, incremental
/// exports are merged into it.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "epf-ingest",
    version,
    about = "Import EPF export files into a relational database",
    long_about = "Imports every selected file of one or more EPF export directories into a \
                  relational database. Full exports are built under a temporary name and swapped \
                  in; incremental exports are merged into the existing tables. An interrupted \
                  import can be continued with --resume."
)]
pub struct Args {
    /// Export directories to import
    #[arg(value_name = "SOURCE_DIRECTORY", required_unless_present = "resume")]
    pub directories: Vec<PathBuf>,

    /// Import EPF Flat files, using the EPF Flat configuration
    #[arg(short = 'f', long = "flat")]
    pub flat: bool,

    /// Resume the most recent import from the snapshot file
    #[arg(short = 'r', long = "resume")]
    pub resume: bool,

    /// Hostname of the database
    #[arg(short = 'd', long = "dbhost", value_name = "HOST")]
    pub db_host: Option<String>,

    /// User executing the database commands
    #[arg(short = 'u', long = "dbuser", value_name = "USER")]
    pub db_user: Option<String>,

    /// Password of the database user
    #[arg(short = 'p', long = "dbpassword", value_name = "PASSWORD")]
    pub db_password: Option<String>,

    /// Name of the database to connect to
    #[arg(short = 'n', long = "dbname", value_name = "NAME")]
    pub db_name: Option<String>,

    /// String separating records; accepts \n, \t and \xNN escapes
    #[arg(short = 's', long = "recordseparator", value_name = "SEP")]
    pub record_sep: Option<String>,

    /// String separating fields; accepts \n, \t and \xNN escapes
    #[arg(short = 't', long = "fieldseparator", value_name = "SEP")]
    pub field_sep: Option<String>,

    /// Include files with dots in their names
    #[arg(short = 'a', long = "allowextensions")]
    pub allow_extensions: bool,

    /// Prefix added to every table name, e.g. 'MyPrefix_video_translation'
    #[arg(short = 'x', long = "tableprefix", value_name = "PREFIX")]
    pub table_prefix: Option<String>,

    /// Regex a file name must match; repeat to add more
    #[arg(short = 'w', long = "whitelist", value_name = "REGEX")]
    pub white_list: Vec<String>,

    /// Regex excluding file names; repeat to add more
    #[arg(short = 'b', long = "blacklist", value_name = "REGEX")]
    pub black_list: Vec<String>,

    /// Skip rows that would violate a primary key in full imports
    #[arg(short = 'k', long = "skipkeyviolators")]
    pub skip_key_violators: bool,

    /// Configuration file; defaults depend on --flat
    #[arg(long = "config", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Snapshot file recording import progress
    #[arg(long = "snapshot", value_name = "PATH", default_value = DEFAULT_SNAPSHOT_PATH)]
    pub snapshot_file: PathBuf,

    /// Also write logs to daily rolling files in this directory
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Args {
    pub fn preset(&self) -> ConfigPreset {
        if self.flat {
            ConfigPreset::Flat
        } else {
            ConfigPreset::Epf
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_file.clone().unwrap_or_else(|| {
            PathBuf::from(if self.flat {
                DEFAULT_FLAT_CONFIG_PATH
            } else {
                DEFAULT_CONFIG_PATH
            })
        })
    }

    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Progress bars only make sense on an interactive, non-quiet run
    pub fn show_progress(&self) -> bool {
        !self.quiet && std::io::IsTerminal::is_terminal(&std::io::stderr())
    }

    /// Overlay the options given on the command line onto `config`
    pub fn apply_to(&self, mut config: ImportConfig) -> Result<ImportConfig> {
        if let Some(host) = &self.db_host {
            config = config.with_database_host(host);
        }
        if let Some(user) = &self.db_user {
            config = config.with_database_user(user);
        }
        if let Some(password) = &self.db_password {
            config = config.with_database_password(password);
        }
        if let Some(name) = &self.db_name {
            config = config.with_database_name(name);
        }
        if let Some(sep) = &self.record_sep {
            config.record_sep = unescape_separator(sep)?;
        }
        if let Some(sep) = &self.field_sep {
            config.field_sep = unescape_separator(sep)?;
        }
        if self.allow_extensions {
            config = config.with_allow_extensions();
        }
        if let Some(prefix) = &self.table_prefix {
            config = config.with_table_prefix(prefix);
        }
        if !self.white_list.is_empty() {
            config = config.with_white_list(self.white_list.clone());
        }
        if !self.black_list.is_empty() {
            config = config.with_black_list(self.black_list.clone());
        }
        if self.skip_key_violators {
            config.ingest.skip_key_violators = true;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Expand `\n`, `\t`, `\\` and `\xNN` escapes in a separator argument
pub fn unescape_separator(raw: &str) -> Result<String> {
    let invalid = || IngestError::configuration(format!("invalid escape in separator '{}'", raw));
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = u8::from_str_radix(&hex, 16).map_err(|_| invalid())?;
                if hex.len() != 2 || !byte.is_ascii() {
                    return Err(invalid());
                }
                out.push(char::from(byte));
            }
            _ => return Err(invalid()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("epf-ingest").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_directories_required_unless_resuming() {
        assert!(Args::try_parse_from(["epf-ingest"]).is_err());
        let args = parse(&["-r"]);
        assert!(args.resume);
        assert!(args.directories.is_empty());
    }

    #[test]
    fn test_repeated_lists() {
        let args = parse(&["-w", "^song", "-w", "artist", "-b", "match", "dir1", "dir2"]);
        assert_eq!(args.white_list, vec!["^song", "artist"]);
        assert_eq!(args.black_list, vec!["match"]);
        assert_eq!(args.directories.len(), 2);
    }

    #[test]
    fn test_flat_config_path() {
        assert_eq!(parse(&["-f", "d"]).config_path(), PathBuf::from(DEFAULT_FLAT_CONFIG_PATH));
        assert_eq!(parse(&["d"]).config_path(), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(parse(&["-f", "d"]).preset(), ConfigPreset::Flat);
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&["d"]).log_level(), "info");
        assert_eq!(parse(&["-vv", "d"]).log_level(), "trace");
        assert_eq!(parse(&["-q", "d"]).log_level(), "warn");
    }

    #[test]
    fn test_apply_overrides_only_given_options() {
        let args = parse(&["-n", "other.db", "-x", "itunes", "-s", "\\x02\\n", "-k", "d"]);
        let config = args.apply_to(ImportConfig::default()).unwrap();

        assert_eq!(config.database.name, "other.db");
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.table_prefix, "itunes");
        assert_eq!(config.record_sep, "\x02\n");
        assert_eq!(config.field_sep, "\x01");
        assert!(config.ingest.skip_key_violators);
        assert_eq!(config.white_list, vec![".*?"]);
    }

    #[test]
    fn test_apply_rejects_equal_separators() {
        let args = parse(&["-s", "\\t", "-t", "\\t", "d"]);
        assert!(args.apply_to(ImportConfig::default()).is_err());
    }

    #[test]
    fn test_unescape_separator() {
        assert_eq!(unescape_separator("\\x01").unwrap(), "\x01");
        assert_eq!(unescape_separator("\\t").unwrap(), "\t");
        assert_eq!(unescape_separator("a\\\\b").unwrap(), "a\\b");
        assert_eq!(unescape_separator("|").unwrap(), "|");
        assert!(unescape_separator("\\q").is_err());
        assert!(unescape_separator("\\x9").is_err());
        assert!(unescape_separator("\\xff").is_err());
    }
}
