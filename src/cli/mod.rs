//! Command-line interface for gantry.
//!
//! Provides commands for deploying services, checking deployment status,
//! listing deployment history, and verifying AWS access and configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::aws::types::TaskDefinition;
use crate::aws::AwsCli;
use crate::config::{self, ResolvedConfig};
use crate::deploy::{dockerfile, DeploymentLog, EcsDeployer};
use crate::domain::{DeployState, DeployTarget, Deployment, DeploymentSpec};
use crate::notify::WebhookPublisher;

/// gantry - Deployment orchestrator for ECS services
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a service
    Deploy(DeployArgs),

    /// Check the status of a deployment
    Status {
        /// Deployment ID (UUID)
        deployment_id: String,
    },

    /// List recent deployments
    History {
        /// Maximum number of deployments to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,

    /// Verify AWS access and required settings
    Check,
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Service name (also the routing path and target group name)
    pub service: String,

    /// Image reference to deploy (registry/repo:tag)
    #[arg(short, long)]
    pub image: Option<String>,

    /// Project directory containing the Dockerfile
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Container port (inferred from the Dockerfile if omitted)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Register this task definition file instead of generating one
    #[arg(long)]
    pub task_definition: Option<PathBuf>,

    /// Commit SHA recorded with the deployment
    #[arg(long)]
    pub sha: Option<String>,

    /// Branch recorded with the deployment
    #[arg(long)]
    pub branch: Option<String>,

    /// AWS region (overrides config)
    #[arg(long)]
    pub region: Option<String>,

    /// ECS cluster (overrides config)
    #[arg(long)]
    pub cluster: Option<String>,

    /// Load balancer listener ARN (overrides config)
    #[arg(long)]
    pub listener_arn: Option<String>,

    /// VPC for target groups (overrides config)
    #[arg(long)]
    pub vpc_id: Option<String>,

    /// Environment label (overrides config)
    #[arg(long)]
    pub environment: Option<String>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Deploy(args) => deploy_service(args).await,
            Commands::Status { deployment_id } => show_status(&deployment_id).await,
            Commands::History { limit } => list_history(limit).await,
            Commands::Config => show_config().await,
            Commands::Check => check_access().await,
        }
    }
}

/// Deploy one service, printing its URL on success
async fn deploy_service(args: DeployArgs) -> Result<()> {
    let cfg = config::config()?;

    let region = args.region.or_else(|| cfg.region.clone()).context(
        "No AWS region configured. Set aws.region in .gantry/config.yaml or pass --region",
    )?;
    let cluster = args.cluster.or_else(|| cfg.target.cluster.clone()).context(
        "No cluster configured. Set target.cluster in .gantry/config.yaml or pass --cluster",
    )?;
    let listener_arn = args
        .listener_arn
        .or_else(|| cfg.target.listener_arn.clone())
        .context(
            "No listener configured. Set target.listener_arn in .gantry/config.yaml or pass --listener-arn",
        )?;
    let vpc_id = args.vpc_id.or_else(|| cfg.target.vpc_id.clone()).context(
        "No VPC configured. Set target.vpc_id in .gantry/config.yaml or pass --vpc-id",
    )?;

    let explicit_definition = match &args.task_definition {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read task definition: {}", path.display()))?;
            let definition: TaskDefinition = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse task definition: {}", path.display()))?;
            Some(definition)
        }
        None => None,
    };

    // Container port: explicit flag first, then the task definition file,
    // then the project's Dockerfile.
    let port = match (args.port, &explicit_definition) {
        (Some(port), _) => port,
        (None, Some(definition)) => definition_port(definition)
            .context("Task definition file declares no container port; pass --port")?,
        (None, None) => {
            let dockerfile_path = args.project_dir.join("Dockerfile");
            dockerfile::exposed_port(&dockerfile_path).await?
        }
    };

    let image = args
        .image
        .clone()
        .or_else(|| explicit_definition.as_ref().and_then(first_image))
        .context("No image to deploy. Pass --image or a --task-definition file")?;

    let mut spec = DeploymentSpec::new(&args.service, image, port);
    spec.sha = args.sha.clone();
    spec.branch = args.branch.clone();
    spec.task_definition = explicit_definition;

    let mut target = DeployTarget::new(cluster, listener_arn, vpc_id);
    target.environment = args.environment.or_else(|| cfg.target.environment.clone());
    target.desired_count = cfg.target.desired_count;
    target.launch_type = cfg.target.launch_type.clone();
    target.subnets = cfg.target.subnets.clone();
    target.security_groups = cfg.target.security_groups.clone();
    target.assign_public_ip = cfg.target.assign_public_ip;
    target.cpu = cfg.target.cpu.clone();
    target.memory = cfg.target.memory.clone();
    target.network_mode = cfg.target.network_mode.clone();
    target.execution_role_arn = cfg.target.execution_role_arn.clone();
    target.requires_compatibilities = cfg.target.requires_compatibilities.clone();

    let aws = aws_client(cfg, region);
    let mut deployer = EcsDeployer::new(
        aws,
        target,
        config::deployments_dir()?,
        config::locks_dir()?,
    );
    if let Some(url) = &cfg.webhook_url {
        deployer = deployer.with_webhook(WebhookPublisher::new(url.clone()));
    }

    let deployment = deployer.deploy(&spec).await?;

    if let Some(url) = deployment.target_url() {
        println!("{}", url);
    }
    eprintln!("\n[Deployment {} completed]", deployment.id);

    Ok(())
}

/// Show the status of a deployment
async fn show_status(deployment_id_str: &str) -> Result<()> {
    let deployment_id = Uuid::parse_str(deployment_id_str)
        .with_context(|| format!("Invalid deployment ID: {}", deployment_id_str))?;

    let root = config::deployments_dir()?;
    let events = DeploymentLog::load(&root, deployment_id)
        .await?
        .with_context(|| format!("Deployment {} not found", deployment_id))?;
    let deployment =
        Deployment::from_events(&events).context("Deployment has no recorded events")?;

    println!("Deployment: {}", deployment.id);
    println!("Service: {}", deployment.service_name);
    println!("State: {}", state_name(&deployment.state));
    if let DeployState::Failed { error } = &deployment.state {
        println!("Error: {}", error);
    }
    println!("Phase: {}", deployment.phase);
    println!("Started: {}", deployment.started_at);
    if let Some(completed) = deployment.completed_at {
        println!("Completed: {}", completed);
    }
    if let Some(reference) = &deployment.task_definition {
        println!("Task definition: {}", reference);
    }
    if let Some(url) = deployment.target_url() {
        println!("URL: {}", url);
    }

    println!("\nEvents:");
    for event in &events {
        println!(
            "  {} {:<16} {}",
            event.timestamp.format("%H:%M:%S"),
            format!("{:?}", event.kind),
            event.summary
        );
    }

    Ok(())
}

/// List recent deployments
async fn list_history(limit: usize) -> Result<()> {
    let root = config::deployments_dir()?;
    let ids = DeploymentLog::list_deployments(&root).await?;

    let mut deployments = Vec::new();
    for id in ids {
        if let Some(events) = DeploymentLog::load(&root, id).await? {
            if let Some(deployment) = Deployment::from_events(&events) {
                deployments.push(deployment);
            }
        }
    }

    if deployments.is_empty() {
        println!("No deployments found");
        return Ok(());
    }

    // Most recent first
    deployments.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    deployments.truncate(limit);

    println!(
        "{:<38} {:<20} {:<10} {:<20}",
        "DEPLOYMENT ID", "SERVICE", "STATE", "STARTED"
    );
    println!("{}", "-".repeat(90));

    for deployment in deployments {
        println!(
            "{:<38} {:<20} {:<10} {:<20}",
            deployment.id,
            deployment.service_name,
            state_name(&deployment.state),
            deployment.started_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Gantry Configuration");
    println!("====================");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:        {}", cfg.home.display());
    println!("  Deployments: {}", cfg.home.join("deployments").display());
    println!("  Locks:       {}", cfg.home.join("locks").display());
    println!();
    println!("AWS:");
    println!("  Region:       {}", cfg.region.as_deref().unwrap_or("(not set)"));
    println!("  Profile:      {}", cfg.profile.as_deref().unwrap_or("(default)"));
    println!("  Binary:       {}", cfg.aws_binary);
    println!("  Call timeout: {}s", cfg.call_timeout.as_secs());
    println!();
    println!("Target:");
    println!(
        "  Cluster:       {}",
        cfg.target.cluster.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Listener ARN:  {}",
        cfg.target.listener_arn.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  VPC:           {}",
        cfg.target.vpc_id.as_deref().unwrap_or("(not set)")
    );
    println!("  Desired count: {}", cfg.target.desired_count);
    if let Some(launch_type) = &cfg.target.launch_type {
        println!("  Launch type:   {}", launch_type);
    }
    if !cfg.target.subnets.is_empty() {
        println!("  Subnets:       {}", cfg.target.subnets.join(", "));
    }
    if !cfg.target.security_groups.is_empty() {
        println!("  Security groups: {}", cfg.target.security_groups.join(", "));
    }
    println!();
    println!("Notify:");
    println!("  Webhook: {}", cfg.webhook_url.as_deref().unwrap_or("(none)"));

    Ok(())
}

/// Verify AWS access and report missing deploy settings
async fn check_access() -> Result<()> {
    let cfg = config::config()?;

    let region = cfg.region.clone().context(
        "No AWS region configured. Set aws.region in .gantry/config.yaml or GANTRY_REGION",
    )?;

    let aws = aws_client(cfg, region.clone());
    let identity = aws
        .verify_identity()
        .await
        .context("AWS access check failed")?;

    println!("AWS access OK");
    println!("  Account: {}", identity.account);
    println!("  Caller:  {}", identity.arn);
    println!("  Region:  {}", region);
    println!();

    let mut missing = Vec::new();
    if cfg.target.cluster.is_none() {
        missing.push("target.cluster");
    }
    if cfg.target.listener_arn.is_none() {
        missing.push("target.listener_arn");
    }
    if cfg.target.vpc_id.is_none() {
        missing.push("target.vpc_id");
    }

    if missing.is_empty() {
        println!("Deploy target configured");
    } else {
        println!("Missing settings (required for deploy): {}", missing.join(", "));
    }

    Ok(())
}

fn aws_client(cfg: &ResolvedConfig, region: String) -> AwsCli {
    let mut aws = AwsCli::new(region).with_call_timeout(cfg.call_timeout);
    if let Some(profile) = &cfg.profile {
        aws = aws.with_profile(profile.clone());
    }
    if cfg.aws_binary != "aws" {
        aws = aws.with_binary(cfg.aws_binary.clone());
    }
    aws
}

/// First declared container port in a task definition file
fn definition_port(definition: &TaskDefinition) -> Option<u16> {
    definition
        .container_definitions
        .iter()
        .flat_map(|container| container.port_mappings.iter())
        .map(|mapping| mapping.container_port)
        .next()
}

fn first_image(definition: &TaskDefinition) -> Option<String> {
    definition
        .container_definitions
        .first()
        .map(|container| container.image.clone())
}

fn state_name(state: &DeployState) -> &'static str {
    match state {
        DeployState::Running => "running",
        DeployState::Done { .. } => "done",
        DeployState::Failed { .. } => "failed",
    }
}
