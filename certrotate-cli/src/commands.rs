//! Command line surface and the events it builds.
//!
//! # Commands
//!
//! - `certrotate issue --principal <id> --client-id <id> --csr-file <path>`
//! - `certrotate activate --client-id <id> --new-certificate-id <id>`
//! - `certrotate deactivate --principal <id> --client-id <id> --old-certificate-id <id>`
//! - `certrotate dispatch --topic <topic> [--event-file <path>]`
//!
//! Endpoint flags come before the subcommand and fall back to `CERTROTATE_*`
//! environment variables.

use std::io::Read;
use std::path::{Path, PathBuf};

use certrotate_core::config::DEFAULT_MAX_ATTEMPTS;
use certrotate_core::{ResponsePayload, RotationConfig, RotationOperation, RotationService};
use clap::{Args, Parser, Subcommand};
use eyre::WrapErr;
use serde_json::{json, Value};

use crate::exit_codes::{codes, map_rotation_error};

/// Zero-downtime certificate rotation for connected devices.
#[derive(Debug, Parser)]
#[command(name = "certrotate", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub endpoints: EndpointArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the registry and the message bus live.
#[derive(Debug, Args)]
pub struct EndpointArgs {
    /// Region of the identity registry.
    #[arg(long, env = "CERTROTATE_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Registry endpoint, instead of the one derived from the region.
    #[arg(long, env = "CERTROTATE_REGISTRY_ENDPOINT")]
    pub registry_endpoint: Option<String>,

    /// Account specific data endpoint results are published through.
    #[arg(long, env = "CERTROTATE_DATA_ENDPOINT")]
    pub data_endpoint: String,

    /// Attempts per registry call, including the first one.
    #[arg(long, env = "CERTROTATE_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Accept plain `http` endpoints (local registries only).
    #[arg(long, env = "CERTROTATE_ALLOW_INSECURE_HTTP")]
    pub allow_insecure_http: bool,
}

impl EndpointArgs {
    /// The service configuration these flags describe.
    pub fn config(&self) -> RotationConfig {
        let mut config = RotationConfig::for_region(&self.region, &self.data_endpoint)
            .with_insecure_http(self.allow_insecure_http);
        if let Some(endpoint) = &self.registry_endpoint {
            config.registry.endpoint.clone_from(endpoint);
        }
        config.registry.max_attempts = self.max_attempts;
        config
    }
}

/// Rotation subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Issue a certificate from a CSR and bind it like the current one.
    ///
    /// The new certificate stays pending activation.
    Issue(IssueArgs),

    /// Activate a certificate issued earlier.
    Activate(ActivateArgs),

    /// Deactivate the certificate a device rotated away from.
    ///
    /// Refused when the principal is the certificate being deactivated.
    Deactivate(DeactivateArgs),

    /// Handle a raw event as if it arrived on a request topic.
    Dispatch(DispatchArgs),
}

/// Arguments for `certrotate issue`.
#[derive(Debug, Args)]
pub struct IssueArgs {
    /// Certificate id the device is currently connected with.
    #[arg(long)]
    pub principal: String,

    /// Client id of the device.
    #[arg(long)]
    pub client_id: String,

    /// File holding the PEM encoded certificate signing request.
    #[arg(long)]
    pub csr_file: PathBuf,
}

/// Arguments for `certrotate activate`.
#[derive(Debug, Args)]
pub struct ActivateArgs {
    /// Client id of the device.
    #[arg(long)]
    pub client_id: String,

    /// Certificate to activate.
    #[arg(long)]
    pub new_certificate_id: String,
}

/// Arguments for `certrotate deactivate`.
#[derive(Debug, Args)]
pub struct DeactivateArgs {
    /// Certificate id the device is currently connected with.
    #[arg(long)]
    pub principal: String,

    /// Client id of the device.
    #[arg(long)]
    pub client_id: String,

    /// Certificate to deactivate.
    #[arg(long)]
    pub old_certificate_id: String,
}

/// Arguments for `certrotate dispatch`.
#[derive(Debug, Args)]
pub struct DispatchArgs {
    /// Request topic, e.g. `certificate/rotation/attach/<client>`.
    #[arg(long)]
    pub topic: String,

    /// JSON event to handle. Read from stdin when omitted.
    #[arg(long)]
    pub event_file: Option<PathBuf>,
}

impl Command {
    /// The request topic and event this command stands for.
    ///
    /// # Errors
    /// Fails if an input file cannot be read or the event is not JSON.
    pub fn request(&self) -> eyre::Result<(String, Value)> {
        match self {
            Self::Issue(args) => {
                let csr = read_file(&args.csr_file)?;
                Ok((
                    RotationOperation::Issue.topic_for(&args.client_id),
                    json!({
                        "principal": args.principal,
                        "clientId": args.client_id,
                        "response": { "csr": csr },
                    }),
                ))
            }
            Self::Activate(args) => Ok((
                RotationOperation::Activate.topic_for(&args.client_id),
                json!({
                    "clientId": args.client_id,
                    "response": { "newCertificateId": args.new_certificate_id },
                }),
            )),
            Self::Deactivate(args) => Ok((
                RotationOperation::Deactivate.topic_for(&args.client_id),
                json!({
                    "principal": args.principal,
                    "clientId": args.client_id,
                    "response": { "oldCertificateId": args.old_certificate_id },
                }),
            )),
            Self::Dispatch(args) => {
                let raw = match &args.event_file {
                    Some(path) => read_file(path)?,
                    None => {
                        let mut raw = String::new();
                        std::io::stdin()
                            .read_to_string(&mut raw)
                            .wrap_err("failed to read the event from stdin")?;
                        raw
                    }
                };
                let event = serde_json::from_str(&raw).wrap_err("the event is not valid JSON")?;
                Ok((args.topic.clone(), event))
            }
        }
    }
}

fn read_file(path: &Path) -> eyre::Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))
}

/// Runs the command and prints the published payload, returning the exit
/// code for the rotation outcome.
///
/// # Errors
/// Fails on invalid configuration or unreadable input, before any request
/// reaches the registry.
pub async fn run(cli: &Cli) -> eyre::Result<u8> {
    let (topic, event) = cli.command.request()?;
    let service = RotationService::from_config(&cli.endpoints.config())
        .wrap_err("invalid endpoint configuration")?;

    tracing::info!(%topic, "handling rotation request");
    let outcome = service.handle_topic(&topic, &event).await;

    let payload = ResponsePayload::from(&outcome);
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(match &outcome {
        Ok(_) => codes::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "rotation request failed");
            map_rotation_error(e)
        }
    })
}
