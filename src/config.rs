//! Configuration parsing for siteforge.toml
//!
//! The file is optional. Without one, the defaults below describe the
//! standard layout (`src/` in, `build/` out).

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SiteError};

/// Config file names to search for
pub const CONFIG_FILES: &[&str] = &["siteforge.toml", "Siteforge.toml"];

/// Font extensions picked up by the copy task
pub const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "eot", "ttf"];

/// Image extensions picked up by the image task
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "svg"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,

    /// Free-form values handed to every page template as `site`
    #[serde(default)]
    pub site: toml::Table,

    #[serde(default)]
    pub styles: Styles,

    #[serde(default)]
    pub scripts: Scripts,

    #[serde(default)]
    pub images: Images,

    #[serde(default)]
    pub serve: Serve,

    #[serde(default)]
    pub deploy: Deploy,

    /// Project root; every relative path above resolves against it
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Paths {
    #[serde(default = "default_source")]
    pub source: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            source: default_source(),
            output: default_output(),
        }
    }
}

fn default_source() -> PathBuf {
    PathBuf::from("src")
}

fn default_output() -> PathBuf {
    PathBuf::from("build")
}

/// Stylesheet entry and prefixing targets
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Styles {
    /// Entry file, relative to the source root
    #[serde(default = "default_style_entry")]
    pub entry: PathBuf,

    /// Browserslist queries for vendor prefixing
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            entry: default_style_entry(),
            browsers: default_browsers(),
        }
    }
}

fn default_style_entry() -> PathBuf {
    PathBuf::from("scss/style.scss")
}

fn default_browsers() -> Vec<String> {
    vec!["last 3 versions".to_string()]
}

/// Script entry and transpile targets
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Scripts {
    /// Entry file, relative to the source root
    #[serde(default = "default_script_entry")]
    pub entry: PathBuf,

    /// Browserslist query the bundle is lowered for
    #[serde(default = "default_script_targets")]
    pub targets: String,

    /// Notify live-reload clients after writing the bundle
    #[serde(default = "default_true")]
    pub live_reload: bool,
}

impl Default for Scripts {
    fn default() -> Self {
        Self {
            entry: default_script_entry(),
            targets: default_script_targets(),
            live_reload: true,
        }
    }
}

fn default_script_entry() -> PathBuf {
    PathBuf::from("js/script.js")
}

fn default_script_targets() -> String {
    "defaults".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Images {
    /// oxipng preset, 0 (fast) to 6 (smallest)
    #[serde(default = "default_png_level")]
    pub png_level: u8,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            png_level: default_png_level(),
        }
    }
}

/// `./a/b` and `a/b` compare equal
fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn default_png_level() -> u8 {
    3
}

/// Development server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Serve {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Page announced when the server starts
    #[serde(default = "default_start_path")]
    pub start_path: String,

    /// Watch debounce delay in milliseconds
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

impl Default for Serve {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            start_path: default_start_path(),
            debounce_ms: default_debounce(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_start_path() -> String {
    "index.html".to_string()
}

fn default_debounce() -> u64 {
    50
}

/// Where `deploy` publishes the output tree
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Deploy {
    /// Git remote name or URL
    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Commit message; a timestamped one is used when unset
    #[serde(default)]
    pub message: Option<String>,
}

impl Default for Deploy {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: default_branch(),
            message: None,
        }
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "gh-pages".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the given path, or search for it upward from
    /// the current directory. Falls back to defaults rooted at the current
    /// directory when no file exists.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let config_path = match path {
            Some(p) if p.exists() => Some(p.to_path_buf()),
            Some(p) => {
                return Err(SiteError::ConfigNotFound {
                    path: p.to_path_buf(),
                })
            }
            None => Self::find_config()?,
        };

        let Some(config_path) = config_path else {
            tracing::debug!("no config file found, using the default layout");
            let mut config = Config::default();
            config.root = std::env::current_dir()?;
            config.validate()?;
            return Ok((config, None));
        };

        let content = std::fs::read_to_string(&config_path)?;
        let mut config = Self::parse(&content).map_err(|e| SiteError::ConfigParse {
            source: e,
            path: config_path.clone(),
        })?;

        config.root = match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        config.validate()?;

        tracing::debug!(path = %config_path.display(), "loaded config");
        Ok((config, Some(config_path)))
    }

    /// Parse a config document without touching the filesystem
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Defaults rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Search for config file starting from current directory
    fn find_config() -> Result<Option<PathBuf>> {
        let mut current = std::env::current_dir()?;

        loop {
            for name in CONFIG_FILES {
                let candidate = current.join(name);
                if candidate.exists() {
                    return Ok(Some(candidate));
                }
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| SiteError::InvalidConfig {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.styles.entry.as_os_str().is_empty() {
            return Err(invalid("styles.entry", "must not be empty"));
        }
        if self.scripts.entry.as_os_str().is_empty() {
            return Err(invalid("scripts.entry", "must not be empty"));
        }
        if self.styles.browsers.is_empty() {
            return Err(invalid("styles.browsers", "needs at least one query"));
        }
        if self.images.png_level > 6 {
            return Err(invalid("images.png_level", "must be between 0 and 6"));
        }
        if self.serve.port == 0 {
            return Err(invalid("serve.port", "must not be 0"));
        }
        if self.serve.debounce_ms == 0 {
            return Err(invalid("serve.debounce_ms", "must be greater than 0"));
        }
        let source = lexical(&self.paths.source);
        let output = lexical(&self.paths.output);
        if output.starts_with(&source) || source.starts_with(&output) {
            return Err(invalid("paths.output", "must not overlap paths.source"));
        }

        Ok(())
    }

    /// Absolute source root
    pub fn source_dir(&self) -> PathBuf {
        self.root.join(&self.paths.source)
    }

    /// Absolute output root
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.paths.output)
    }

    /// Source-root-relative path made absolute
    pub fn source_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.source_dir().join(rel)
    }

    /// Output-root-relative path made absolute
    pub fn output_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.output_dir().join(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_layout_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.paths.source, PathBuf::from("src"));
        assert_eq!(config.paths.output, PathBuf::from("build"));
        assert_eq!(config.styles.entry, PathBuf::from("scss/style.scss"));
        assert_eq!(config.styles.browsers, vec!["last 3 versions"]);
        assert_eq!(config.scripts.entry, PathBuf::from("js/script.js"));
        assert!(config.scripts.live_reload);
        assert_eq!(config.serve.debounce_ms, 50);
        assert_eq!(config.serve.start_path, "index.html");
        assert_eq!(config.deploy.branch, "gh-pages");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_overrides() {
        let toml = r#"
            [paths]
            source = "site"
            output = "dist"

            [site]
            title = "Portfolio"

            [scripts]
            live_reload = false

            [serve]
            port = 8080
        "#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.paths.source, PathBuf::from("site"));
        assert_eq!(config.paths.output, PathBuf::from("dist"));
        assert_eq!(config.site.get("title").and_then(|v| v.as_str()), Some("Portfolio"));
        assert!(!config.scripts.live_reload);
        assert_eq!(config.serve.port, 8080);
        assert_eq!(config.serve.debounce_ms, 50);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(Config::parse("[serve]\nprot = 1\n").is_err());
    }

    #[test]
    fn test_validate_png_level() {
        let mut config = Config::with_root("/tmp/site");
        config.images.png_level = 9;
        assert!(matches!(
            config.validate(),
            Err(SiteError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validate_same_source_and_output() {
        let config = Config::parse("[paths]\nsource = \"x\"\noutput = \"x\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_nested_output() {
        let overlapping = [
            ("src", "src/build"),
            ("./src", "src/out/site"),
            ("site/src", "site"),
            ("src", "."),
        ];
        for (source, output) in overlapping {
            let mut config = Config::with_root("/tmp/site");
            config.paths.source = PathBuf::from(source);
            config.paths.output = PathBuf::from(output);
            match config.validate() {
                Err(SiteError::InvalidConfig { field, .. }) => assert_eq!(field, "paths.output"),
                other => panic!("{source} / {output}: {other:?}"),
            }
        }

        let mut config = Config::with_root("/tmp/site");
        config.paths.output = PathBuf::from("src-build");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_png_level_is_lossless_preset_3() {
        assert_eq!(Config::with_root("/tmp/site").images.png_level, 3);
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let config = Config::with_root("/work/site");
        assert_eq!(config.output_dir(), PathBuf::from("/work/site/build"));
        assert_eq!(
            config.source_path("scss/style.scss"),
            PathBuf::from("/work/site/src/scss/style.scss")
        );
    }
}
