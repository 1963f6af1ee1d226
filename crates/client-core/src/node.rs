use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Where to fetch work and how to authenticate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn trimmed(value: &mut Option<String>) {
    *value = value.as_ref().map(|s| s.trim().to_string());
    if matches!(value.as_deref(), Some(s) if s.is_empty()) {
        *value = None;
    }
}

impl NodeConfig {
    fn normalize(&mut self) {
        trimmed(&mut self.url);
        trimmed(&mut self.user);
        // Passwords may legitimately carry spaces; only drop empty ones.
        if matches!(self.password.as_deref(), Some("")) {
            self.password = None;
        }
    }

    /// Fields set in `overrides` replace ours.
    pub fn merged_with(mut self, overrides: NodeConfig) -> NodeConfig {
        if overrides.url.is_some() {
            self.url = overrides.url;
        }
        if overrides.user.is_some() {
            self.user = overrides.user;
        }
        if overrides.password.is_some() {
            self.password = overrides.password;
        }
        self.normalize();
        self
    }
}

fn xdg_config_home() -> anyhow::Result<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME") {
        let dir = PathBuf::from(dir);
        if dir.as_os_str().is_empty() {
            anyhow::bail!("XDG_CONFIG_HOME is set but empty");
        }
        return Ok(dir);
    }

    let home = std::env::var_os("HOME").ok_or_else(|| anyhow::anyhow!("HOME is not set"))?;
    let home = PathBuf::from(home);
    if home.as_os_str().is_empty() {
        anyhow::bail!("HOME is set but empty");
    }
    Ok(home.join(".config"))
}

pub fn node_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_home()?.join("hashforge").join("config.json"))
}

pub fn load_node_config() -> anyhow::Result<Option<NodeConfig>> {
    load_node_config_from(&node_config_path()?)
}

pub fn load_node_config_from(path: &Path) -> anyhow::Result<Option<NodeConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    let mut cfg: NodeConfig =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    cfg.normalize();
    Ok(Some(cfg))
}

pub fn save_node_config(cfg: &NodeConfig) -> anyhow::Result<()> {
    save_node_config_to(&node_config_path()?, cfg)
}

pub fn save_node_config_to(path: &Path, cfg: &NodeConfig) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid config path: {}", path.display()))?;
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let mut cfg = cfg.clone();
    cfg.normalize();

    let json = serde_json::to_string_pretty(&cfg)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

/// Load the saved config, running first-run setup when `interactive` and nothing usable exists.
pub fn ensure_node_config(interactive: bool) -> anyhow::Result<Option<NodeConfig>> {
    match load_node_config() {
        Ok(Some(cfg)) => return Ok(Some(cfg)),
        Ok(None) => {}
        Err(err) => {
            if !interactive {
                return Err(err);
            }
            eprintln!("warning: failed to read node config (will recreate): {err:#}");
        }
    }
    if !interactive {
        return Ok(None);
    }

    let cfg = prompt_node_config()?;
    save_node_config(&cfg)?;
    Ok(Some(cfg))
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    let mut out = std::io::stdout();
    out.write_all(prompt.as_bytes())?;
    out.flush()?;

    let mut buf = String::new();
    std::io::stdin().read_line(&mut buf)?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}

fn looks_like_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn prompt_node_config() -> anyhow::Result<NodeConfig> {
    let path = node_config_path()?;
    println!("First-run setup (saved to {}).", path.display());
    println!("Press ENTER to leave a field empty.");

    let url = loop {
        let v = prompt_line("Node URL (http://host:8332/): ")?;
        let v = v.trim().to_string();
        if v.is_empty() || looks_like_http_url(&v) {
            break v;
        }
        println!("Invalid URL: expected http://… or https://… (or leave empty).");
    };
    let user = prompt_line("RPC user: ")?;
    let password = prompt_line("RPC password: ")?;

    let mut cfg = NodeConfig {
        url: Some(url),
        user: Some(user),
        password: Some(password),
    };
    cfg.normalize();
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "hashforge-client-core-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = scratch_dir("missing");
        assert_eq!(load_node_config_from(&dir.join("config.json")).unwrap(), None);
    }

    #[test]
    fn save_then_load_normalizes_fields() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("hashforge").join("config.json");
        let cfg = NodeConfig {
            url: Some("  http://127.0.0.1:8332/ ".to_string()),
            user: Some("   ".to_string()),
            password: Some(" pass word ".to_string()),
        };

        save_node_config_to(&path, &cfg).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = load_node_config_from(&path).unwrap().unwrap();
        assert_eq!(
            loaded,
            NodeConfig {
                url: Some("http://127.0.0.1:8332/".to_string()),
                user: None,
                password: Some(" pass word ".to_string()),
            }
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_and_missing_fields_are_tolerated() {
        let dir = scratch_dir("partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"url":"http://node/","extra":1}"#).unwrap();

        let loaded = load_node_config_from(&path).unwrap().unwrap();
        assert_eq!(loaded.url.as_deref(), Some("http://node/"));
        assert_eq!(loaded.user, None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = scratch_dir("malformed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let err = load_node_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let base = NodeConfig {
            url: Some("http://a/".to_string()),
            user: Some("alice".to_string()),
            password: Some("secret".to_string()),
        };
        let merged = base.merged_with(NodeConfig {
            url: Some("http://b/".to_string()),
            ..NodeConfig::default()
        });
        assert_eq!(merged.url.as_deref(), Some("http://b/"));
        assert_eq!(merged.user.as_deref(), Some("alice"));
        assert_eq!(merged.password.as_deref(), Some("secret"));
    }
}
