//! CLI route: single dispatch table from parsed commands onto registry
//! operations. Long-running commands (watch, heartbeat --follow) print as
//! they go and end on ctrl-c.

use crate::cli::parse::{Commands, IdentityArgs};
use crate::cli::presentation::{
    format_change_event, format_liveness, format_outcome, format_record, format_record_list,
    OutputFormat,
};
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::record::{Maintenance, ServiceIdentity, ServiceRecord, Status};
use crate::registry::{GetManyFilter, Registry};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info};

/// Execution context for one CLI invocation
pub struct RunContext {
    registry: Registry,
}

impl RunContext {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Connect to the substrate named by the environment
    pub async fn connect() -> Result<Self, RegistryError> {
        let config = RegistryConfig::from_env()?;
        debug!(endpoint = %config.endpoint(), namespace = %config.key_namespace, "connecting");
        let registry = Registry::connect(config).await?;
        Ok(Self::new(registry))
    }

    /// Execute one command, returning its rendered output. Streaming
    /// commands print lines directly and return a closing summary.
    pub async fn execute(&self, command: Commands) -> Result<String, RegistryError> {
        match command {
            Commands::Update {
                uuid,
                service_type,
                host,
                region,
                down,
                format,
            } => {
                let format = parse_format(&format)?;
                let mut record = ServiceRecord {
                    uuid: uuid.unwrap_or_default(),
                    service_type,
                    host,
                    region,
                    ..Default::default()
                };
                record.set_status(if down { Status::Down } else { Status::Up });
                let outcome = self.registry.update(&record).await?;
                Ok(format_outcome("update", &outcome, format))
            }
            Commands::Down {
                identity,
                note,
                start,
                end,
                format,
            } => {
                let format = parse_format(&format)?;
                let identity = parse_identity(&identity)?;
                let maintenance = note.map(|note| Maintenance { note, start, end });
                let outcome = self.registry.down(&identity, maintenance).await?;
                Ok(format_outcome("down", &outcome, format))
            }
            Commands::Delete { identity, format } => {
                let format = parse_format(&format)?;
                let identity = parse_identity(&identity)?;
                let outcome = self.registry.delete(&identity).await?;
                Ok(format_outcome("delete", &outcome, format))
            }
            Commands::Get { identity, format } => {
                let format = parse_format(&format)?;
                let identity = parse_identity(&identity)?;
                let record = self.registry.get_one(&identity).await?;
                Ok(format_record(record.as_ref(), format))
            }
            Commands::List {
                region,
                status,
                service_type,
                host_prefix,
                format,
            } => {
                let format = parse_format(&format)?;
                let filter = parse_filter(region, status, service_type, host_prefix)?;
                let records: Vec<ServiceRecord> =
                    self.registry.get_many(filter).await?.try_collect().await?;
                Ok(format_record_list(&records, format))
            }
            Commands::Status { identity, format } => {
                let format = parse_format(&format)?;
                let identity = parse_identity(&identity)?;
                let up = self.registry.is_up(&identity).await?;
                Ok(format_liveness(&identity, up, format))
            }
            Commands::Heartbeat {
                identity,
                follow,
                format,
            } => {
                let format = parse_format(&format)?;
                let identity = parse_identity(&identity)?;
                let outcome = self.registry.heartbeat(&identity).await?;
                if !follow {
                    return Ok(format_outcome("heartbeat", &outcome, format));
                }
                let lease = outcome.lease.ok_or_else(|| {
                    RegistryError::Lease("heartbeat granted no lease".to_string())
                })?;
                println!("{}", format_outcome("heartbeat", &outcome, format));
                let keeper = self.registry.keep_alive(lease);
                info!(uuid = %outcome.uuid, lease, "refreshing lease until interrupted");
                tokio::signal::ctrl_c()
                    .await
                    .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
                keeper.stop().await?;
                Ok("Heartbeat stopped.".to_string())
            }
            Commands::Watch { identity, format } => {
                let format = parse_format(&format)?;
                let identity = parse_identity(&identity)?;
                let Some(mut watch) = self.registry.notify(&identity).await? else {
                    return Ok(format!("No record for {}; nothing to watch.", identity));
                };
                loop {
                    tokio::select! {
                        interrupt = tokio::signal::ctrl_c() => {
                            interrupt.map_err(|e| RegistryError::Unavailable(e.to_string()))?;
                            watch.cancel();
                            return Ok("Watch cancelled.".to_string());
                        }
                        event = watch.next() => match event {
                            Some(Ok(event)) => println!("{}", format_change_event(&event, format)),
                            Some(Err(e)) => return Err(e),
                            None => return Ok("Watch ended.".to_string()),
                        },
                    }
                }
            }
        }
    }
}

fn parse_format(format: &str) -> Result<OutputFormat, RegistryError> {
    match format {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(RegistryError::Validation(format!(
            "unrecognized output format: {} (must be 'text' or 'json')",
            other
        ))),
    }
}

fn parse_identity(args: &IdentityArgs) -> Result<ServiceIdentity, RegistryError> {
    match (&args.uuid, &args.service_type, &args.host) {
        (Some(uuid), _, _) => Ok(ServiceIdentity::uuid(uuid)),
        (None, Some(service_type), Some(host)) => {
            Ok(ServiceIdentity::type_host(service_type, host))
        }
        _ => Err(RegistryError::Validation(
            "provide --uuid or both --service-type and --host".to_string(),
        )),
    }
}

fn parse_filter(
    region: Option<String>,
    status: Option<String>,
    service_type: Option<String>,
    host_prefix: Option<String>,
) -> Result<GetManyFilter, RegistryError> {
    match (region, status, service_type) {
        (Some(region), None, None) => Ok(GetManyFilter::Region(region)),
        (None, Some(status), None) => Ok(GetManyFilter::Status(status.parse()?)),
        (None, None, Some(service_type)) => Ok(GetManyFilter::TypeHost {
            service_type,
            host_prefix,
        }),
        _ => Err(RegistryError::Validation(
            "provide exactly one of --region, --status, or --service-type".to_string(),
        )),
    }
}
