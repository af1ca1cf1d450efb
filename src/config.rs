use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::stats::PolicyClass;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bot: BotConfig,
    pub group: GroupConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub members: Vec<MemberSeed>,
    #[serde(default)]
    pub tags: TagsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub token: String,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    pub name: String,
    pub chat_id: i64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RuntimeConfig {
    pub data_dir: Option<String>,
    pub autodelete_secs: Option<u64>,
    pub pending_media_ttl_secs: Option<u64>,
}

/// One row of the member table. The policy column picks the penalty
/// rule-set, so adding or removing a special member is a config change.
#[derive(Debug, Deserialize, Clone)]
pub struct MemberSeed {
    pub tg_id: u64,
    pub name: String,
    #[serde(default)]
    pub policy: PolicyClass,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TagsConfig {
    #[serde(default = "default_meal_tags")]
    pub meal: Vec<String>,
    #[serde(default = "default_workout_tags")]
    pub workout: Vec<String>,
    #[serde(default = "default_cheat_tags")]
    pub cheat: Vec<String>,
}

impl Default for TagsConfig {
    fn default() -> Self {
        TagsConfig {
            meal: default_meal_tags(),
            workout: default_workout_tags(),
            cheat: default_cheat_tags(),
        }
    }
}

fn default_meal_tags() -> Vec<String> {
    ["#еда", "#meal", "#food", "#кушать", "#завтрак", "#обед", "#ужин"]
        .map(String::from)
        .to_vec()
}

fn default_workout_tags() -> Vec<String> {
    ["#спортзал", "#gym", "#зал", "#workout", "#треня", "#спорт"]
        .map(String::from)
        .to_vec()
}

fn default_cheat_tags() -> Vec<String> {
    ["#читы", "#cheat", "#чит", "#вредное"].map(String::from).to_vec()
}

pub fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        i += 1;
    }
    None
}

pub fn load_config(path: &PathBuf) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: Config = serde_yaml::from_str(&text).context("parse yaml")?;
    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.bot.token.trim().is_empty() {
        return Err(anyhow!("bot.token is empty"));
    }
    if cfg.group.chat_id == 0 {
        return Err(anyhow!("group.chat_id is missing"));
    }

    let mut seen = HashSet::new();
    for m in &cfg.members {
        if !seen.insert(m.tg_id) {
            return Err(anyhow!("duplicate tg_id {} in members", m.tg_id));
        }
        if m.name.trim().is_empty() {
            return Err(anyhow!("member {} has an empty seed name", m.tg_id));
        }
    }

    for (label, list) in [
        ("meal", &cfg.tags.meal),
        ("workout", &cfg.tags.workout),
        ("cheat", &cfg.tags.cheat),
    ] {
        if list.is_empty() {
            return Err(anyhow!("tags.{label} is empty"));
        }
        if list.iter().any(|t| t.trim().is_empty()) {
            return Err(anyhow!("tags.{label} contains a blank entry"));
        }
    }

    if let Some(secs) = cfg.runtime.autodelete_secs {
        if secs == 0 || secs > 24 * 3600 {
            return Err(anyhow!("runtime.autodelete_secs={secs} out of range (1..=86400)"));
        }
    }
    if let Some(secs) = cfg.runtime.pending_media_ttl_secs {
        if secs == 0 || secs > 24 * 3600 {
            return Err(anyhow!(
                "runtime.pending_media_ttl_secs={secs} out of range (1..=86400)"
            ));
        }
    }

    Ok(())
}

/// The member -> policy table consulted at report time.
pub fn policy_table(cfg: &Config) -> HashMap<u64, PolicyClass> {
    cfg.members.iter().map(|m| (m.tg_id, m.policy)).collect()
}
