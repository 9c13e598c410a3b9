//! Configuration loading from mcp-tools.toml.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mcp::ServerConfig;
use policy::ToolFilter;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Whether the working folder is trusted. Trusted tools in a trusted
    /// folder run without confirmation.
    #[serde(default)]
    pub folder_trusted: bool,

    /// Where inline images are written. Defaults to the OS temp directory.
    #[serde(default)]
    pub image_dir: Option<PathBuf>,

    /// Filter applied to every server's tools.
    #[serde(default)]
    pub tools: ToolFilter,

    /// MCP servers keyed by name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields the
    /// default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.tools.validate()?;
        for (name, server) in &mut config.servers {
            if server.name.is_empty() {
                server.name = name.clone();
            }
            if server.command.is_empty() {
                return Err(ConfigError::MissingCommand(name.clone()));
            }
            server_filter(server).validate()?;
        }
        Ok(config)
    }
}

/// Tool filter built from a server's `include_tools` and `exclude_tools`.
pub fn server_filter(server: &ServerConfig) -> ToolFilter {
    ToolFilter::new(server.include_tools.clone(), server.exclude_tools.clone())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("server '{0}' has no command")]
    MissingCommand(String),

    #[error(transparent)]
    Filter(#[from] policy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = Config::parse(
            r#"
folder_trusted = true
image_dir = "/tmp/mcp-images"

[tools]
exclude = ["fs__delete_file"]

[servers.fs]
command = "mcp-server-filesystem"
args = ["/home/me"]
trust = true
include_tools = ["read_file", "list_directory"]

[servers.search]
command = "search-server"
env = { API_KEY = "abc" }
"#,
        )
        .unwrap();

        assert!(config.folder_trusted);
        assert_eq!(config.image_dir, Some(PathBuf::from("/tmp/mcp-images")));
        assert_eq!(config.tools.exclude, vec!["fs__delete_file"]);

        let fs = &config.servers["fs"];
        assert_eq!(fs.name, "fs");
        assert_eq!(fs.args, vec!["/home/me"]);
        assert!(fs.trust);
        assert!(server_filter(fs).allows("fs", "read_file"));
        assert!(!server_filter(fs).allows("fs", "write_file"));

        let search = &config.servers["search"];
        assert_eq!(search.name, "search");
        assert!(!search.trust);
        assert_eq!(search.env.get("API_KEY").map(String::as_str), Some("abc"));
    }

    #[test]
    fn empty_config_is_default() {
        let config = Config::parse("").unwrap();
        assert!(!config.folder_trusted);
        assert!(config.image_dir.is_none());
        assert!(config.servers.is_empty());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("mcp-tools.toml")).unwrap();
        assert!(config.servers.is_empty());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp-tools.toml");
        std::fs::write(&path, "[servers.echo]\ncommand = \"echo-server\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.servers["echo"].command, "echo-server");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Config::parse("[servers.x]\nargs = []\n"),
            Err(ConfigError::Parse(_)) | Err(ConfigError::MissingCommand(_))
        ));
        assert!(matches!(
            Config::parse("[tools]\ninclude = [\"fs__\"]\n"),
            Err(ConfigError::Filter(_))
        ));
        assert!(matches!(
            Config::parse("folder_trusted = \"yes\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
