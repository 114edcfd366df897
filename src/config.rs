//! Configuration for gantry.
//!
//! Sources, highest priority first:
//! 1. Environment variables (GANTRY_HOME, GANTRY_REGION, GANTRY_CLUSTER, ...)
//! 2. Config file (.gantry/config.yaml, found by walking up from the
//!    working directory)
//! 3. Defaults (~/.gantry)
//!
//! Paths inside the config file are resolved relative to the .gantry
//! directory that contains it.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Cached configuration; a failed load is cached too, so every caller
/// sees the same error.
static CONFIG: OnceLock<std::result::Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_AWS_BINARY: &str = "aws";
const DEFAULT_CALL_TIMEOUT_SECONDS: u64 = 300;

/// On-disk schema of .gantry/config.yaml.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub aws: Option<AwsConfig>,
    #[serde(default)]
    pub target: Option<TargetConfig>,
    #[serde(default)]
    pub notify: Option<NotifyConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to the config file)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    /// AWS CLI binary, when not simply `aws` on PATH
    pub binary: Option<String>,
    pub call_timeout_seconds: Option<u64>,
}

/// Where deploys land by default. All fields can be overridden per deploy
/// from the command line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetConfig {
    pub cluster: Option<String>,
    pub listener_arn: Option<String>,
    pub vpc_id: Option<String>,
    pub environment: Option<String>,
    pub desired_count: Option<i64>,
    pub launch_type: Option<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    pub assign_public_ip: Option<bool>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub network_mode: Option<String>,
    pub execution_role_arn: Option<String>,
    #[serde(default)]
    pub requires_compatibilities: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
}

/// Settings after merging environment, config file, and defaults.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to gantry home (deployment state)
    pub home: PathBuf,
    /// AWS region, if configured anywhere
    pub region: Option<String>,
    /// AWS CLI profile
    pub profile: Option<String>,
    /// AWS CLI binary
    pub aws_binary: String,
    /// Per-call timeout for AWS CLI invocations
    pub call_timeout: Duration,
    /// Default deploy target settings
    pub target: TargetSettings,
    /// Webhook for deployment notifications
    pub webhook_url: Option<String>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Target settings with defaults applied; required fields stay optional
/// here because `status`/`history` work without any of them.
#[derive(Debug, Clone)]
pub struct TargetSettings {
    pub cluster: Option<String>,
    pub listener_arn: Option<String>,
    pub vpc_id: Option<String>,
    pub environment: Option<String>,
    pub desired_count: i64,
    pub launch_type: Option<String>,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: Option<bool>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub network_mode: Option<String>,
    pub execution_role_arn: Option<String>,
    pub requires_compatibilities: Vec<String>,
}

/// Walk up from the working directory looking for .gantry/config.yaml.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(".gantry").join("config.yaml"))
        .find(|candidate| candidate.exists())
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Absolute paths pass through; relative ones hang off `base`.
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = Path::new(path_str);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let joined = base.join(path);
    joined.canonicalize().unwrap_or(joined)
}

fn env_or(key: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(key).ok().or(fallback)
}

/// Merge environment, config file, and defaults into the resolved view.
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".gantry");

    let config_file = find_config_file();
    let file = match &config_file {
        Some(path) => Some(load_config_file(path)?),
        None => None,
    };

    let home = if let Ok(env_home) = std::env::var("GANTRY_HOME") {
        PathBuf::from(env_home)
    } else if let Some(home_path) = file.as_ref().and_then(|f| f.paths.home.as_ref()) {
        let gantry_dir = config_file
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(Path::new("."));
        resolve_path(gantry_dir, home_path)
    } else {
        default_home
    };

    let aws = file.as_ref().and_then(|f| f.aws.clone()).unwrap_or_default();
    let region = env_or("GANTRY_REGION", aws.region);
    let profile = env_or("GANTRY_PROFILE", aws.profile);
    let aws_binary = aws
        .binary
        .unwrap_or_else(|| DEFAULT_AWS_BINARY.to_string());
    let call_timeout = Duration::from_secs(
        aws.call_timeout_seconds
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECONDS),
    );

    let raw_target = file
        .as_ref()
        .and_then(|f| f.target.clone())
        .unwrap_or_default();
    let target = TargetSettings {
        cluster: env_or("GANTRY_CLUSTER", raw_target.cluster),
        listener_arn: env_or("GANTRY_LISTENER_ARN", raw_target.listener_arn),
        vpc_id: env_or("GANTRY_VPC_ID", raw_target.vpc_id),
        environment: raw_target.environment,
        desired_count: raw_target.desired_count.unwrap_or(1),
        launch_type: raw_target.launch_type,
        subnets: raw_target.subnets,
        security_groups: raw_target.security_groups,
        assign_public_ip: raw_target.assign_public_ip,
        cpu: raw_target.cpu,
        memory: raw_target.memory,
        network_mode: raw_target.network_mode,
        execution_role_arn: raw_target.execution_role_arn,
        requires_compatibilities: raw_target.requires_compatibilities,
    };

    let webhook_url = env_or(
        "GANTRY_WEBHOOK_URL",
        file.as_ref()
            .and_then(|f| f.notify.as_ref())
            .and_then(|n| n.webhook_url.clone()),
    );

    Ok(ResolvedConfig {
        home,
        region,
        profile,
        aws_binary,
        call_timeout,
        target,
        webhook_url,
        config_file,
    })
}

/// The process-wide configuration, resolved on first use.
pub fn config() -> Result<&'static ResolvedConfig> {
    CONFIG
        .get_or_init(|| load_config().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|message| anyhow::anyhow!("{message}"))
}

/// Resolve configuration from scratch, bypassing the cache.
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

// ============================================================================
// Convenience functions
// ============================================================================

/// The gantry home directory holding deployment state.
pub fn gantry_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Directory deployment event logs live under ($GANTRY_HOME/deployments)
pub fn deployments_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("deployments"))
}

/// Directory deploy lock files live under ($GANTRY_HOME/locks)
pub fn locks_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("locks"))
}
