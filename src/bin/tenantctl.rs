use clap::{Parser, Subcommand};
use serde_json::Value;
use tenant_store::config::StoreConfig;
use tenant_store::console::Console;
use tenant_store::model::{default_tenants, Tenant};
use tenant_store::ALL_RECORDS;

#[derive(Parser)]
#[command(author, version, about = "Inspect and edit a tenant store data directory", long_about = None)]
struct Cli {
    /// Overrides TENANT_STORE_DATA_DIR.
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Overrides TENANT_STORE_WRITE_ATTEMPTS.
    #[arg(long)]
    write_attempts: Option<u32>,

    /// Overrides TENANT_STORE_WRITE_BACKOFF_MS.
    #[arg(long)]
    write_backoff_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// List saved blob names.
    Blobs,
    /// Print a blob.
    Get { blob: String },
    /// Replace a blob with a JSON value. Tenants are edited with the tenant commands.
    Set { blob: String, value: String },
    /// List tenants.
    Tenants,
    AddTenant {
        name: String,
        #[arg(short, long, default_value = "")]
        email: String,
    },
    /// Shallow-merge a JSON object into a tenant.
    PatchTenant { id: String, patch: String },
    DeleteTenant { id: String },
}

impl Cli {
    /// Applies command-line overrides on top of `base`.
    fn config(&self, base: StoreConfig) -> StoreConfig {
        let mut config = base;
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(attempts) = self.write_attempts {
            config.write_attempts = attempts;
        }
        if let Some(backoff) = self.write_backoff_ms {
            config.write_backoff_ms = backoff;
        }
        config
    }
}

fn check_settable(blob: &str) -> anyhow::Result<()> {
    if blob == ALL_RECORDS {
        anyhow::bail!(
            "{} holds the tenant collection; use add-tenant, patch-tenant or delete-tenant instead",
            ALL_RECORDS
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = cli.config(StoreConfig::from_env());

    let console = Console::open(&config, default_tenants()).await?;
    if console.is_degraded() {
        eprintln!("warning: data directory unusable, changes will not be saved");
    }

    match cli.command {
        Commands::Blobs => {
            let names = console.store().names().await?;
            println!("{}", serde_json::to_string_pretty(&names)?);
        }
        Commands::Get { blob } => match console.store().load(&blob).await? {
            Some(val) => println!("{}", serde_json::to_string_pretty(&val)?),
            None => anyhow::bail!("blob {} not found", blob),
        },
        Commands::Set { blob, value } => {
            check_settable(&blob)?;
            let val: Value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            console.store().save(&blob, val).await?;
            println!("OK");
        }
        Commands::Tenants => {
            let tenants = console.tenants().records();
            println!("{}", serde_json::to_string_pretty(&tenants)?);
        }
        Commands::AddTenant { name, email } => {
            let tenant = console.tenants().add_record(|| Tenant::new(name, email))?;
            println!("{}", serde_json::to_string_pretty(&tenant)?);
        }
        Commands::PatchTenant { id, patch } => {
            let patch: Value = serde_json::from_str(&patch)?;
            let fields = patch
                .as_object()
                .ok_or_else(|| anyhow::anyhow!("patch must be a JSON object"))?
                .clone();
            if fields.contains_key("id") {
                anyhow::bail!("patch cannot change a tenant id");
            }

            // Validate the merged shape before touching the collection.
            let current = console
                .tenants()
                .get(&id)
                .ok_or_else(|| anyhow::anyhow!("tenant {} not found", id))?;
            let mut merged = serde_json::to_value(&current)?;
            if let Some(obj) = merged.as_object_mut() {
                obj.extend(fields);
            }
            let patched: Tenant = serde_json::from_value(merged)?;

            let tenant = console.tenants().mutate(&id, |_| patched)?;
            println!("{}", serde_json::to_string_pretty(&tenant)?);
        }
        Commands::DeleteTenant { id } => {
            console.tenants().delete_record(&id)?;
            println!("OK");
        }
    }

    console.flush().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "tenantctl",
            "--data-dir",
            "/tmp/console",
            "--write-attempts",
            "7",
            "--write-backoff-ms",
            "15",
            "tenants",
        ])
        .unwrap();
        let config = cli.config(StoreConfig::default());

        assert_eq!(config.data_dir, PathBuf::from("/tmp/console"));
        assert_eq!(config.write_attempts, 7);
        assert_eq!(config.write_backoff_ms, 15);
    }

    #[test]
    fn test_missing_flags_keep_config() {
        let cli = Cli::try_parse_from(["tenantctl", "blobs"]).unwrap();
        let base = StoreConfig { data_dir: PathBuf::from("x"), write_attempts: 9, write_backoff_ms: 1 };
        assert_eq!(cli.config(base.clone()), base);
    }

    #[test]
    fn test_set_refuses_tenant_collection() {
        let err = check_settable(ALL_RECORDS).unwrap_err();
        assert!(err.to_string().contains("add-tenant"));
        assert!(check_settable("global_settings").is_ok());
    }
}
